// libs/booking-cell/src/handlers.rs
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

use crate::models::{
    BookingError, ConfirmBookingRequest, CreateHoldRequest, DirectBookingRequest,
    RescheduleRequest,
};
use crate::services::booking::BookingService;
use crate::services::holds::SlotHoldService;

pub fn map_booking_error(e: BookingError) -> AppError {
    match e {
        BookingError::HoldNotFound => AppError::NotFound("Hold not found".to_string()),
        BookingError::HoldExpired => AppError::Gone("Hold has expired".to_string()),
        BookingError::HoldOwnershipMismatch => {
            AppError::Auth("Hold belongs to another patient".to_string())
        }
        BookingError::SlotAlreadyBooked => {
            AppError::Conflict("Slot is already booked".to_string())
        }
        BookingError::SlotCurrentlyHeld => {
            AppError::Conflict("Slot is currently held".to_string())
        }
        BookingError::SlotBookedByAnother => {
            AppError::Conflict("Slot was booked by another patient".to_string())
        }
        BookingError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        BookingError::InvalidStatusTransition { from, to } => AppError::BadRequest(format!(
            "Invalid status transition from {} to {}",
            from, to
        )),
        BookingError::InvalidTime(msg) | BookingError::ValidationError(msg) => {
            AppError::BadRequest(msg)
        }
        BookingError::Unauthorized => {
            AppError::Auth("Not authorized for this appointment".to_string())
        }
        BookingError::DatabaseError(msg) => AppError::Database(msg),
    }
}

fn patient_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id).map_err(|_| AppError::BadRequest("Invalid user ID".to_string()))
}

#[axum::debug_handler]
pub async fn create_hold(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateHoldRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = patient_uuid(&user)?;
    let service = SlotHoldService::new(&state);

    let receipt = service
        .create_hold(patient_id, request, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "hold": receipt
    })))
}

#[axum::debug_handler]
pub async fn confirm_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<ConfirmBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let patient_id = patient_uuid(&user)?;
    let service = BookingService::new(&state);

    let appointment = service
        .confirm_from_hold(patient_id, request, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}

/// Staff-initiated booking that bypasses the hold flow.
#[axum::debug_handler]
pub async fn create_direct_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<DirectBookingRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .create_direct_appointment(&user, request, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment created"
    })))
}

/// Storage hygiene endpoint; expiry is enforced lazily regardless.
#[axum::debug_handler]
pub async fn purge_expired_holds(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    if !user.is_admin() {
        return Err(AppError::Auth("Admin access required".to_string()));
    }

    let service = SlotHoldService::new(&state);
    let purged = service
        .purge_expired_holds(auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "purged": purged
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .get_appointment(appointment_id, auth.token())
        .await
        .map_err(map_booking_error)?;

    let is_party = user.id == appointment.patient_id.to_string()
        || user.id == appointment.doctor_id.to_string();
    if !user.is_admin() && !is_party {
        return Err(AppError::Auth(
            "Not authorized for this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn check_in(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .check_in(appointment_id, &user, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Checked in"
    })))
}

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .start_consultation(appointment_id, &user, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Consultation started"
    })))
}

#[axum::debug_handler]
pub async fn end_consultation(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .end_consultation(appointment_id, &user, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Consultation completed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .cancel_appointment(appointment_id, &user, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(&state);

    let appointment = service
        .reschedule_appointment(appointment_id, &user, request, auth.token())
        .await
        .map_err(map_booking_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment rescheduled"
    })))
}
