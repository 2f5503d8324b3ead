// libs/cascade-cell/src/handlers.rs
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

use booking_cell::handlers::map_booking_error;

use crate::models::{CascadeError, RescheduleDecision, UnavailabilityRequest};
use crate::services::cascade::CascadeService;

fn map_cascade_error(e: CascadeError) -> AppError {
    match e {
        CascadeError::ClinicNotFound => AppError::NotFound("Clinic not found".to_string()),
        CascadeError::DoctorNotFound => AppError::NotFound("Doctor not found".to_string()),
        CascadeError::InvalidInterval(msg) => AppError::BadRequest(msg),
        CascadeError::Unauthorized => {
            AppError::Auth("Not authorized for this doctor".to_string())
        }
        CascadeError::Booking(inner) => map_booking_error(inner),
        CascadeError::DatabaseError(msg) => AppError::Database(msg),
    }
}

/// Declare emergency leave and cascade every displaced appointment.
#[axum::debug_handler]
pub async fn declare_emergency_leave(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UnavailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Auth(
            "Only providers may declare emergency leave".to_string(),
        ));
    }

    let doctor_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))?;

    let service = CascadeService::new(&state);
    let result = service
        .handle_unavailability(doctor_id, &user, request, auth.token())
        .await
        .map_err(map_cascade_error)?;

    Ok(Json(json!({
        "success": true,
        "cascade": result
    })))
}

/// Patient resolves a parked appointment: accept an offered alternative or
/// cancel the visit.
#[axum::debug_handler]
pub async fn confirm_reschedule(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(decision): Json<RescheduleDecision>,
) -> Result<Json<Value>, AppError> {
    let service = CascadeService::new(&state);

    let message = match decision {
        RescheduleDecision::Accept { .. } => "Appointment rescheduled",
        RescheduleDecision::Cancel => "Appointment cancelled",
    };

    let appointment = service
        .confirm_reschedule(appointment_id, &user, decision, auth.token())
        .await
        .map_err(map_cascade_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": message
    })))
}
