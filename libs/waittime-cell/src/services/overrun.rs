use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, Timelike, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use booking_cell::models::Appointment;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{OverrunEstimate, OverrunRecomputeSummary, WaittimeError};

#[derive(Debug, Clone)]
pub struct OverrunConfig {
    pub window_days: i64,
    pub default_overrun_factor: f64,
}

impl Default for OverrunConfig {
    fn default() -> Self {
        Self {
            window_days: 30,
            default_overrun_factor: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketStats {
    pub overrun_factor: f64,
    pub avg_wait_minutes: f64,
    pub sample_count: usize,
}

/// Aggregate completed appointments into (weekday, hour) lateness buckets.
/// The factor is the mean actual consult length over the doctor's average
/// consult length, floored at 1.0; `avg_wait_minutes` is the mean lag
/// between the scheduled start and when the consult actually began.
/// Appointments without both consult timestamps are skipped.
pub fn compute_buckets(
    appointments: &[Appointment],
    avg_consult_minutes: i64,
) -> HashMap<(u32, u32), BucketStats> {
    let mut samples: HashMap<(u32, u32), Vec<(f64, f64)>> = HashMap::new();
    let avg_consult_secs = avg_consult_minutes as f64 * 60.0;

    for appointment in appointments {
        let (Some(started), Some(ended)) =
            (appointment.consult_started_at, appointment.consult_ended_at)
        else {
            continue;
        };

        let actual = (ended - started).num_seconds();
        if actual <= 0 {
            continue;
        }

        let delay_minutes = (started - appointment.start_ts).num_seconds() as f64 / 60.0;

        let key = (
            appointment.start_ts.weekday().num_days_from_monday(),
            appointment.start_ts.hour(),
        );
        samples
            .entry(key)
            .or_default()
            .push((actual as f64, delay_minutes.max(0.0)));
    }

    samples
        .into_iter()
        .map(|(key, pairs)| {
            let n = pairs.len() as f64;
            let mean_duration = pairs.iter().map(|(d, _)| d).sum::<f64>() / n;
            let mean_delay = pairs.iter().map(|(_, w)| w).sum::<f64>() / n;
            (
                key,
                BucketStats {
                    overrun_factor: (mean_duration / avg_consult_secs).max(1.0),
                    avg_wait_minutes: mean_delay,
                    sample_count: pairs.len(),
                },
            )
        })
        .collect()
}

/// Recomputes per-doctor overrun buckets from recent history. Idempotent:
/// rerunning over the same history writes the same factors.
pub struct OverrunService {
    supabase: Arc<SupabaseClient>,
    config: OverrunConfig,
}

impl OverrunService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            config: OverrunConfig::default(),
        }
    }

    pub async fn recompute_for_doctor(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<OverrunRecomputeSummary, WaittimeError> {
        let avg_consult_minutes = self.get_doctor_avg_minutes(doctor_id, auth_token).await?;
        if avg_consult_minutes <= 0 {
            return Err(WaittimeError::NotEstimable(
                "doctor has no average consult length".to_string(),
            ));
        }

        let window_start = Utc::now() - Duration::days(self.config.window_days);
        let start_enc = urlencoding::encode(&window_start.to_rfc3339()).to_string();

        let completed: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&status=eq.completed&start_ts=gte.{}&consult_started_at=not.is.null&consult_ended_at=not.is.null",
                    doctor_id, start_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        let buckets = compute_buckets(&completed, avg_consult_minutes);
        let mut written = 0;
        let mut failed = 0;

        // Buckets are upserted one at a time; a failed bucket keeps its
        // previous factor and the rest still land.
        for ((weekday, hour_of_day), stats) in &buckets {
            let row = OverrunEstimate {
                doctor_id,
                weekday: *weekday,
                hour_of_day: *hour_of_day,
                overrun_factor: stats.overrun_factor,
                avg_wait_minutes: stats.avg_wait_minutes,
                sample_count: stats.sample_count as i64,
                updated_at: Utc::now(),
            };
            let body = serde_json::to_value(&row)
                .map_err(|e| WaittimeError::DatabaseError(e.to_string()))?;

            let result: Result<Vec<Value>, _> = self
                .supabase
                .request_with_headers(
                    Method::POST,
                    "/rest/v1/overrun_estimates?on_conflict=doctor_id,weekday,hour_of_day",
                    Some(auth_token),
                    Some(body),
                    Some(Self::upsert_headers()),
                )
                .await;

            match result {
                Ok(_) => written += 1,
                Err(err) => {
                    warn!(
                        "Overrun bucket ({}, {}) for doctor {} failed to persist: {}",
                        weekday, hour_of_day, doctor_id, err
                    );
                    failed += 1;
                }
            }
        }

        info!(
            "Overrun recompute for doctor {}: {} buckets written, {} failed, {} appointments sampled",
            doctor_id,
            written,
            failed,
            completed.len()
        );

        Ok(OverrunRecomputeSummary {
            doctor_id,
            buckets_written: written,
            buckets_failed: failed,
            appointments_sampled: completed.len(),
        })
    }

    async fn get_doctor_avg_minutes(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<i64, WaittimeError> {
        let rows: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/doctors?id=eq.{}&select=avg_consult_minutes",
                    doctor_id
                ),
                Some(auth_token),
                None,
            )
            .await?;

        rows.into_iter()
            .next()
            .and_then(|row| row.get("avg_consult_minutes").and_then(Value::as_i64))
            .ok_or(WaittimeError::DoctorNotFound)
    }

    fn upsert_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=representation"),
        );
        headers
    }
}
