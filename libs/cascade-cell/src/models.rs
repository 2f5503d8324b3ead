use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    /// Search radius around the original clinic.
    pub max_radius_km: f64,
    /// Alternatives offered per affected appointment.
    pub max_alternatives: usize,
    /// Beyond this time shift, a closer clinic beats a closer time.
    pub time_dominance_minutes: i64,
    /// Budget per candidate doctor/clinic slot lookup.
    pub candidate_timeout_ms: u64,
    /// Concurrent in-flight candidate lookups and appointment cascades.
    pub fanout_limit: usize,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_radius_km: 8.0,
            max_alternatives: 3,
            time_dominance_minutes: 60,
            candidate_timeout_ms: 2000,
            fanout_limit: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnavailabilityRequest {
    pub clinic_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub reason: Option<String>,
}

/// One proposed replacement slot, possibly with a different doctor or
/// clinic than the original appointment.
#[derive(Debug, Clone, Serialize)]
pub struct RescheduleAlternative {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub clinic_id: Uuid,
    pub clinic_name: String,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Shift from the original start; negative means earlier.
    pub time_delta_minutes: i64,
    pub distance_km: f64,
}

#[derive(Debug, Serialize)]
pub struct AppointmentCascadeOutcome {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub alternatives: Vec<RescheduleAlternative>,
    /// Set when this appointment could not be parked for a decision; the
    /// rest of the cascade proceeds regardless.
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CascadeResult {
    pub affected_count: usize,
    pub outcomes: Vec<AppointmentCascadeOutcome>,
}

/// Patient's answer to an emergency reschedule offer: take one of the
/// proposed slots, or cancel the visit outright.
#[derive(Debug, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RescheduleDecision {
    Accept {
        doctor_id: Uuid,
        clinic_id: Uuid,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
    },
    Cancel,
}

/// Pushed to the patient after an emergency cascade parks their
/// appointment. Alternatives may be empty; cancelling is always an option.
#[derive(Debug, Serialize)]
pub struct RescheduleOptionsEvent {
    pub event_type: &'static str,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub reason: Option<String>,
    pub alternatives: Vec<RescheduleAlternative>,
}

#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Booking error: {0}")]
    Booking(#[from] booking_cell::models::BookingError),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for CascadeError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Auth(_) => CascadeError::Unauthorized,
            other => CascadeError::DatabaseError(other.to_string()),
        }
    }
}
