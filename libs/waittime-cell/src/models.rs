use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::SupabaseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    Scheduled,
    Waiting,
    InConsultation,
}

/// Point-in-time wait estimate for one appointment. Advisory: the inputs
/// (queue, averages, overrun factors) can all lag reality slightly.
#[derive(Debug, Clone, Serialize)]
pub struct WaitEstimate {
    pub appointment_id: Uuid,
    pub status: WaitStatus,
    pub queue_position: usize,
    pub estimated_wait_minutes: i64,
    /// Time until the scheduled start, set only while the appointment is
    /// still in the future.
    pub minutes_until_start: Option<i64>,
    pub avg_consult_minutes: i64,
    pub overrun_factor: f64,
    pub computed_at: DateTime<Utc>,
}

/// Historical lateness for one (doctor, weekday, hour) bucket. A factor of
/// 1.2 means consultations in that bucket run 20% over the doctor's average
/// length. Floored at 1.0: running early never shortens an estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrunEstimate {
    pub doctor_id: Uuid,
    pub weekday: u32,
    pub hour_of_day: u32,
    pub overrun_factor: f64,
    /// Mean lag between the scheduled start and when the consult actually
    /// began.
    pub avg_wait_minutes: f64,
    pub sample_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OverrunRecomputeSummary {
    pub doctor_id: Uuid,
    pub buckets_written: usize,
    pub buckets_failed: usize,
    pub appointments_sampled: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WaittimeError {
    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("No wait estimate for this appointment: {0}")]
    NotEstimable(String),

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<SupabaseError> for WaittimeError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Auth(_) => WaittimeError::Unauthorized,
            other => WaittimeError::DatabaseError(other.to_string()),
        }
    }
}
