// libs/schedule-cell/src/services/slots.rs
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{BlockType, BookableSlot, ScheduleBlock, ScheduleError};
use crate::services::blocks::ScheduleBlockService;

pub struct SlotListingService {
    supabase: Arc<SupabaseClient>,
    blocks: ScheduleBlockService,
}

impl SlotListingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            blocks: ScheduleBlockService::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            blocks: ScheduleBlockService::with_client(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Bookable slots for one doctor/clinic on a calendar date: the
    /// `slot_minutes + buffer_minutes` grid of every `work` block, minus
    /// starts already taken by a blocking appointment or a live hold.
    pub async fn list_bookable_slots(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<BookableSlot>, ScheduleError> {
        debug!("Listing bookable slots for doctor {} on {}", doctor_id, date);

        let day_start = date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let day_end = day_start + Duration::days(1);

        let blocks = self
            .blocks
            .get_blocks_in_range(doctor_id, day_start, day_end, auth_token)
            .await?;

        let booked = self
            .blocks
            .get_blocking_appointments(doctor_id, day_start, day_end, auth_token)
            .await?;
        let booked_starts: HashSet<DateTime<Utc>> =
            booked.iter().map(|a| a.start_ts).collect();

        let held_starts = self
            .get_live_hold_starts(doctor_id, day_start, day_end, auth_token)
            .await?;

        let mut slots = Vec::new();
        for block in blocks
            .iter()
            .filter(|b| b.block_type == BlockType::Work && b.clinic_id == clinic_id)
        {
            slots.extend(generate_block_slots(block, &booked_starts, &held_starts));
        }

        slots.sort_by(|a, b| a.start_ts.cmp(&b.start_ts));

        debug!("Found {} bookable slots", slots.len());
        Ok(slots)
    }

    /// Starts of active, unexpired holds in the window. Expiry is purely a
    /// timestamp comparison; rows past their TTL are treated as absent.
    async fn get_live_hold_starts(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<HashSet<DateTime<Utc>>, ScheduleError> {
        let now = Utc::now();
        let path = format!(
            "/rest/v1/slot_holds?doctor_id=eq.{}&status=eq.active&ttl_expires_at=gt.{}&start_ts=gte.{}&start_ts=lt.{}",
            doctor_id,
            urlencoding::encode(&now.to_rfc3339()),
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        let mut starts = HashSet::new();
        for row in result {
            if let Some(ts) = row.get("start_ts").and_then(|v| v.as_str()) {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
                    starts.insert(parsed.with_timezone(&Utc));
                }
            }
        }

        Ok(starts)
    }
}

/// Walk a work block on its slot grid. Free function so the grid logic is
/// testable without a store.
pub fn generate_block_slots(
    block: &ScheduleBlock,
    booked_starts: &HashSet<DateTime<Utc>>,
    held_starts: &HashSet<DateTime<Utc>>,
) -> Vec<BookableSlot> {
    let slot_minutes = match block.slot_minutes {
        Some(m) if m > 0 => m,
        _ => return Vec::new(),
    };
    let buffer_minutes = block.buffer_minutes.unwrap_or(0).max(0);
    let step = Duration::minutes((slot_minutes + buffer_minutes) as i64);
    let slot_len = Duration::minutes(slot_minutes as i64);

    let mut slots = Vec::new();
    let mut current = block.start_ts;

    while current + slot_len <= block.end_ts {
        if !booked_starts.contains(&current) && !held_starts.contains(&current) {
            slots.push(BookableSlot {
                doctor_id: block.doctor_id,
                clinic_id: block.clinic_id,
                start_ts: current,
                end_ts: current + slot_len,
            });
        }
        current += step;
    }

    slots
}
