// libs/schedule-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    CreateScheduleBlockRequest, ScheduleError, ScheduleQuery, SlotQuery,
    UpdateScheduleBlockRequest,
};
use crate::services::blocks::ScheduleBlockService;
use crate::services::slots::SlotListingService;

fn map_schedule_error(e: ScheduleError) -> AppError {
    match e {
        ScheduleError::BlockNotFound => AppError::NotFound("Schedule block not found".to_string()),
        ScheduleError::ClinicNotFound => AppError::NotFound("Clinic not found".to_string()),
        ScheduleError::ScheduleOverlap => {
            AppError::Conflict("Schedule block overlaps an existing block".to_string())
        }
        ScheduleError::DuplicateBlock => {
            AppError::Conflict("An identical schedule block already exists".to_string())
        }
        ScheduleError::BlockInUse => AppError::Conflict(
            "Schedule block has booked appointments and cannot be removed".to_string(),
        ),
        ScheduleError::InvalidInterval(msg) | ScheduleError::ValidationError(msg) => {
            AppError::BadRequest(msg)
        }
        ScheduleError::Unauthorized => {
            AppError::Auth("Not authorized to manage this schedule".to_string())
        }
        ScheduleError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn doctor_uuid(user: &User) -> Result<Uuid, AppError> {
    if !user.is_doctor() && !user.is_admin() {
        return Err(AppError::Auth(
            "Only providers may manage schedule blocks".to_string(),
        ));
    }
    Uuid::parse_str(&user.id).map_err(|_| AppError::BadRequest("Invalid doctor ID".to_string()))
}

#[axum::debug_handler]
pub async fn create_schedule_block(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateScheduleBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_uuid(&user)?;
    let service = ScheduleBlockService::new(&state);

    let block = service
        .create_block(doctor_id, request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule_block": block,
        "message": "Schedule block created successfully"
    })))
}

#[axum::debug_handler]
pub async fn update_schedule_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateScheduleBlockRequest>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_uuid(&user)?;
    let service = ScheduleBlockService::new(&state);

    let block = service
        .update_block(block_id, doctor_id, request, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "schedule_block": block,
        "message": "Schedule block updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn delete_schedule_block(
    State(state): State<Arc<AppConfig>>,
    Path(block_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_uuid(&user)?;
    let service = ScheduleBlockService::new(&state);

    service
        .delete_block(block_id, doctor_id, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Schedule block deleted successfully"
    })))
}

/// Provider-facing schedule overview: blocks, appointments and summary for a
/// date window.
#[axum::debug_handler]
pub async fn get_schedule(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<ScheduleQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = doctor_uuid(&user)?;
    let service = ScheduleBlockService::new(&state);

    let overview = service
        .schedule_overview(doctor_id, query, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!(overview)))
}

/// Patient-facing slot listing for one doctor/clinic/date.
#[axum::debug_handler]
pub async fn list_bookable_slots(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<SlotQuery>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(_user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = SlotListingService::new(&state);

    let slots = service
        .list_bookable_slots(query.doctor_id, query.clinic_id, query.date, auth.token())
        .await
        .map_err(map_schedule_error)?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}
