// libs/schedule-cell/src/services/blocks.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    BlockType, BookedAppointment, CreateScheduleBlockRequest, ScheduleBlock, ScheduleError,
    ScheduleOverview, ScheduleQuery, ScheduleSummary, UpdateScheduleBlockRequest,
};
use crate::services::overlap::{check_interval, is_well_formed, IntervalConflict};

pub struct ScheduleBlockService {
    supabase: Arc<SupabaseClient>,
}

fn representation_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

impl ScheduleBlockService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create a schedule block after rejecting malformed intervals and any
    /// overlap with existing blocks of the same (doctor, clinic), regardless
    /// of block type. Exact duplicates get their own error.
    pub async fn create_block(
        &self,
        doctor_id: Uuid,
        request: CreateScheduleBlockRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        debug!(
            "Creating {} block for doctor {} at clinic {}",
            request.block_type, doctor_id, request.clinic_id
        );

        if !is_well_formed(request.start_ts, request.end_ts) {
            return Err(ScheduleError::InvalidInterval(
                "start_ts must be before end_ts".to_string(),
            ));
        }

        if request.block_type == BlockType::Work {
            match request.slot_minutes {
                Some(m) if m > 0 => {}
                _ => {
                    return Err(ScheduleError::ValidationError(
                        "work blocks require a positive slot_minutes".to_string(),
                    ))
                }
            }
            if request.buffer_minutes.map_or(false, |b| b < 0) {
                return Err(ScheduleError::ValidationError(
                    "buffer_minutes cannot be negative".to_string(),
                ));
            }
        }

        self.check_block_conflicts(
            doctor_id,
            request.clinic_id,
            request.start_ts,
            request.end_ts,
            None,
            auth_token,
        )
        .await?;

        let block_data = json!({
            "doctor_id": doctor_id,
            "clinic_id": request.clinic_id,
            "block_type": request.block_type,
            "start_ts": request.start_ts.to_rfc3339(),
            "end_ts": request.end_ts.to_rfc3339(),
            "slot_minutes": request.slot_minutes,
            "buffer_minutes": request.buffer_minutes,
            "created_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedule_blocks",
                Some(auth_token),
                Some(block_data),
                Some(representation_headers()),
            )
            .await?;

        let block: ScheduleBlock = result
            .into_iter()
            .next()
            .ok_or_else(|| ScheduleError::DatabaseError("Failed to create schedule block".to_string()))
            .and_then(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse block: {}", e)))
            })?;

        info!("Schedule block {} created for doctor {}", block.id, doctor_id);
        Ok(block)
    }

    /// Update a block's interval or slot parameters, re-running the overlap
    /// check against every other block of the pair.
    pub async fn update_block(
        &self,
        block_id: Uuid,
        doctor_id: Uuid,
        request: UpdateScheduleBlockRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        debug!("Updating schedule block {}", block_id);

        let current = self.get_block(block_id, auth_token).await?;
        if current.doctor_id != doctor_id {
            return Err(ScheduleError::Unauthorized);
        }

        let new_start = request.start_ts.unwrap_or(current.start_ts);
        let new_end = request.end_ts.unwrap_or(current.end_ts);

        if !is_well_formed(new_start, new_end) {
            return Err(ScheduleError::InvalidInterval(
                "start_ts must be before end_ts".to_string(),
            ));
        }

        self.check_block_conflicts(
            current.doctor_id,
            current.clinic_id,
            new_start,
            new_end,
            Some(block_id),
            auth_token,
        )
        .await?;

        let mut update_data = serde_json::Map::new();
        update_data.insert("start_ts".to_string(), json!(new_start.to_rfc3339()));
        update_data.insert("end_ts".to_string(), json!(new_end.to_rfc3339()));
        if let Some(slot_minutes) = request.slot_minutes {
            update_data.insert("slot_minutes".to_string(), json!(slot_minutes));
        }
        if let Some(buffer_minutes) = request.buffer_minutes {
            update_data.insert("buffer_minutes".to_string(), json!(buffer_minutes));
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/schedule_blocks?id=eq.{}", block_id);
        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(Value::Object(update_data)),
                Some(representation_headers()),
            )
            .await?;

        result
            .into_iter()
            .next()
            .ok_or(ScheduleError::BlockNotFound)
            .and_then(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse block: {}", e)))
            })
    }

    /// Delete a block, refusing while any confirmed or started appointment
    /// still occupies its interval.
    pub async fn delete_block(
        &self,
        block_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        debug!("Deleting schedule block {}", block_id);

        let block = self.get_block(block_id, auth_token).await?;
        if block.doctor_id != doctor_id {
            return Err(ScheduleError::Unauthorized);
        }

        let occupying = self
            .get_blocking_appointments(block.doctor_id, block.start_ts, block.end_ts, auth_token)
            .await?;

        if !occupying.is_empty() {
            warn!(
                "Refusing to delete block {} - {} appointments occupy it",
                block_id,
                occupying.len()
            );
            return Err(ScheduleError::BlockInUse);
        }

        let path = format!("/rest/v1/schedule_blocks?id=eq.{}", block_id);
        let _: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(auth_token),
                None,
                Some(representation_headers()),
            )
            .await?;

        info!("Schedule block {} deleted", block_id);
        Ok(())
    }

    pub async fn get_block(
        &self,
        block_id: Uuid,
        auth_token: &str,
    ) -> Result<ScheduleBlock, ScheduleError> {
        let path = format!("/rest/v1/schedule_blocks?id=eq.{}", block_id);
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .next()
            .ok_or(ScheduleError::BlockNotFound)
            .and_then(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse block: {}", e)))
            })
    }

    /// All blocks for a doctor intersecting [from, to), every clinic.
    pub async fn get_blocks_in_range(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<ScheduleBlock>, ScheduleError> {
        let path = format!(
            "/rest/v1/schedule_blocks?doctor_id=eq.{}&start_ts=lt.{}&end_ts=gt.{}&order=start_ts.asc",
            doctor_id,
            urlencoding::encode(&to.to_rfc3339()),
            urlencoding::encode(&from.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse blocks: {}", e)))
            })
            .collect()
    }

    /// Schedule overview for the provider dashboard: blocks plus booked
    /// appointments in the window, with rollup counts.
    pub async fn schedule_overview(
        &self,
        doctor_id: Uuid,
        query: ScheduleQuery,
        auth_token: &str,
    ) -> Result<ScheduleOverview, ScheduleError> {
        let blocks = self
            .get_blocks_in_range(doctor_id, query.start_date, query.end_date, auth_token)
            .await?;

        let appointments = self
            .get_appointments_in_range(doctor_id, query.start_date, query.end_date, auth_token)
            .await?;

        let summary = ScheduleSummary {
            work_blocks: blocks.iter().filter(|b| b.block_type == BlockType::Work).count(),
            break_blocks: blocks.iter().filter(|b| b.block_type == BlockType::Break).count(),
            holiday_blocks: blocks
                .iter()
                .filter(|b| b.block_type == BlockType::Holiday)
                .count(),
            booked_appointments: appointments.len(),
        };

        Ok(ScheduleOverview {
            schedule_blocks: blocks,
            appointments,
            summary,
        })
    }

    /// Confirmed/started appointments whose start falls inside [from, to).
    pub async fn get_blocking_appointments(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<BookedAppointment>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&status=in.(confirmed,started)&start_ts=gte.{}&start_ts=lt.{}&order=start_ts.asc",
            doctor_id,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    ScheduleError::DatabaseError(format!("Failed to parse appointments: {}", e))
                })
            })
            .collect()
    }

    async fn get_appointments_in_range(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<Vec<BookedAppointment>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&start_ts=gte.{}&start_ts=lt.{}&order=start_ts.asc",
            doctor_id,
            urlencoding::encode(&from.to_rfc3339()),
            urlencoding::encode(&to.to_rfc3339()),
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await?;

        result
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| {
                    ScheduleError::DatabaseError(format!("Failed to parse appointments: {}", e))
                })
            })
            .collect()
    }

    async fn check_block_conflicts(
        &self,
        doctor_id: Uuid,
        clinic_id: Uuid,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
        exclude_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), ScheduleError> {
        let mut path = format!(
            "/rest/v1/schedule_blocks?doctor_id=eq.{}&clinic_id=eq.{}&start_ts=lte.{}&end_ts=gte.{}",
            doctor_id,
            clinic_id,
            urlencoding::encode(&end_ts.to_rfc3339()),
            urlencoding::encode(&start_ts.to_rfc3339()),
        );

        if let Some(id) = exclude_id {
            path.push_str(&format!("&id=neq.{}", id));
        }

        let existing: Vec<ScheduleBlock> = {
            let result: Vec<Value> = self
                .supabase
                .request(Method::GET, &path, Some(auth_token), None)
                .await?;
            result
                .into_iter()
                .map(|row| {
                    serde_json::from_value(row).map_err(|e| {
                        ScheduleError::DatabaseError(format!("Failed to parse blocks: {}", e))
                    })
                })
                .collect::<Result<Vec<ScheduleBlock>, ScheduleError>>()?
        };

        let intervals: Vec<_> = existing.iter().map(|b| (b.start_ts, b.end_ts)).collect();

        match check_interval(&intervals, (start_ts, end_ts)) {
            Ok(()) => Ok(()),
            Err(IntervalConflict::Duplicate) => {
                warn!(
                    "Duplicate schedule block rejected for doctor {} at {}",
                    doctor_id, start_ts
                );
                Err(ScheduleError::DuplicateBlock)
            }
            Err(IntervalConflict::Overlap) => {
                warn!(
                    "Overlapping schedule block rejected for doctor {} at {}",
                    doctor_id, start_ts
                );
                Err(ScheduleError::ScheduleOverlap)
            }
        }
    }
}
