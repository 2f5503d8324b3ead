// libs/schedule-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE AVAILABILITY MODELS
// ==============================================================================

/// A practice location. Coordinates feed the cascade's radius search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub avg_consult_minutes: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Work,
    Break,
    Holiday,
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockType::Work => write!(f, "work"),
            BlockType::Break => write!(f, "break"),
            BlockType::Holiday => write!(f, "holiday"),
        }
    }
}

/// A declared interval of provider availability or unavailability at one
/// clinic. Intervals are half-open `[start_ts, end_ts)`; no two blocks for
/// the same (doctor, clinic) may overlap regardless of type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleBlock {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub block_type: BlockType,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    /// Booking granularity; only meaningful for `work` blocks.
    pub slot_minutes: Option<i32>,
    /// Gap inserted between generated slots; only meaningful for `work` blocks.
    pub buffer_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateScheduleBlockRequest {
    pub clinic_id: Uuid,
    pub block_type: BlockType,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub slot_minutes: Option<i32>,
    pub buffer_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleBlockRequest {
    pub start_ts: Option<DateTime<Utc>>,
    pub end_ts: Option<DateTime<Utc>>,
    pub slot_minutes: Option<i32>,
    pub buffer_minutes: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleQuery {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub date: NaiveDate,
}

/// Lightweight projection of an appointment row, enough for the schedule
/// overview and for slot exclusion without depending on the booking cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookableSlot {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub work_blocks: usize,
    pub break_blocks: usize,
    pub holiday_blocks: usize,
    pub booked_appointments: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOverview {
    pub schedule_blocks: Vec<ScheduleBlock>,
    pub appointments: Vec<BookedAppointment>,
    pub summary: ScheduleSummary,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Schedule block not found")]
    BlockNotFound,

    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("Schedule block overlaps an existing block")]
    ScheduleOverlap,

    #[error("An identical schedule block already exists")]
    DuplicateBlock,

    #[error("Schedule block has booked appointments and cannot be removed")]
    BlockInUse,

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized schedule access")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<shared_database::SupabaseError> for ScheduleError {
    fn from(e: shared_database::SupabaseError) -> Self {
        ScheduleError::DatabaseError(e.to_string())
    }
}
