// libs/waittime-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::WaittimeError;
use crate::services::estimator::WaitEstimatorService;
use crate::services::overrun::OverrunService;

fn map_waittime_error(e: WaittimeError) -> AppError {
    match e {
        WaittimeError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        WaittimeError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        WaittimeError::NotEstimable(msg) => AppError::BadRequest(msg),
        WaittimeError::Unauthorized => {
            AppError::Auth("Not authorized for this appointment".to_string())
        }
        WaittimeError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn get_wait_estimate(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = WaitEstimatorService::new(&state);

    let estimate = service
        .get_wait_estimate(appointment_id, &user, auth.token())
        .await
        .map_err(map_waittime_error)?;

    Ok(Json(json!(estimate)))
}

/// Rebuild a doctor's overrun buckets from recent completed visits.
#[axum::debug_handler]
pub async fn recompute_overruns(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() && user.id != doctor_id.to_string() {
        return Err(AppError::Auth(
            "Only the doctor or an admin may trigger a recompute".to_string(),
        ));
    }

    let service = OverrunService::new(&state);
    let summary = service
        .recompute_for_doctor(doctor_id, auth.token())
        .await
        .map_err(map_waittime_error)?;

    Ok(Json(json!({
        "success": true,
        "summary": summary
    })))
}
