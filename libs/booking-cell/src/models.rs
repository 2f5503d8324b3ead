use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;

/// Lifecycle of a booked appointment. Terminal states never transition
/// again; `confirmed` and `started` are the slot-blocking states that
/// participate in conflict checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Confirmed,
    Started,
    Completed,
    Cancelled,
    Rescheduled,
    PendingPatientDecision,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed
                | AppointmentStatus::Cancelled
                | AppointmentStatus::Rescheduled
        )
    }

    pub fn is_slot_blocking(&self) -> bool {
        matches!(self, AppointmentStatus::Confirmed | AppointmentStatus::Started)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Started => "started",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::PendingPatientDecision => "pending_patient_decision",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    FirstVisit,
    FollowUp,
    Procedure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub visit_type: VisitType,
    pub status: AppointmentStatus,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Free-form visit location, for home visits and external sites.
    pub address: Option<String>,
    pub fee: Option<f64>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub consult_started_at: Option<DateTime<Utc>>,
    pub consult_ended_at: Option<DateTime<Utc>>,
    pub rescheduled_from: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Consumed,
    Expired,
}

/// A short-lived reservation on a concrete slot. Expiry is lazy: nothing
/// flips the row to `expired` at the deadline, so liveness is always
/// re-derived from `ttl_expires_at` at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotHold {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: HoldStatus,
    pub ttl_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SlotHold {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && now <= self.ttl_expires_at
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HoldReceipt {
    pub hold_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub expires_in_seconds: i64,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmBookingRequest {
    pub hold_id: Uuid,
    pub visit_type: VisitType,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DirectBookingRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub visit_type: VisitType,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub fee: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct RescheduleRequest {
    pub new_start_ts: DateTime<Utc>,
    pub new_end_ts: DateTime<Utc>,
    /// Target provider, when moving the visit to a colleague. Defaults to
    /// the original doctor.
    #[serde(default)]
    pub new_doctor_id: Option<Uuid>,
    #[serde(default)]
    pub new_clinic_id: Option<Uuid>,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Hold not found")]
    HoldNotFound,

    #[error("Hold has expired")]
    HoldExpired,

    #[error("Hold belongs to another patient")]
    HoldOwnershipMismatch,

    #[error("Slot is already booked")]
    SlotAlreadyBooked,

    #[error("Slot is currently held")]
    SlotCurrentlyHeld,

    #[error("Slot was booked by another patient")]
    SlotBookedByAnother,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: AppointmentStatus, to: AppointmentStatus },

    #[error("Invalid time range: {0}")]
    InvalidTime(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for BookingError {
    fn from(err: SupabaseError) -> Self {
        match err {
            // The only unique constraints in this cell guard slot identity,
            // so a 409 from the store means another writer won the slot.
            SupabaseError::Conflict(_) => BookingError::SlotBookedByAnother,
            SupabaseError::Auth(_) => BookingError::Unauthorized,
            other => BookingError::DatabaseError(other.to_string()),
        }
    }
}
