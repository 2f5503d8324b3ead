use std::sync::Arc;

use chrono::{Datelike, Duration, Timelike, Utc};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use booking_cell::models::{Appointment, AppointmentStatus};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::models::{OverrunEstimate, WaitEstimate, WaitStatus, WaittimeError};
use crate::services::overrun::OverrunConfig;

/// Number of not-yet-completed appointments for the same doctor on the same
/// day that start at or before the target, excluding the target itself.
/// Cancelled and parked appointments stay in the count until the clinic
/// actually clears them; that errs on the side of longer estimates.
pub fn queue_position(target: &Appointment, same_day: &[Appointment]) -> usize {
    same_day
        .iter()
        .filter(|a| {
            a.id != target.id
                && a.status != AppointmentStatus::Completed
                && a.start_ts <= target.start_ts
        })
        .count()
}

pub fn estimated_wait_minutes(
    queue_position: usize,
    avg_consult_minutes: i64,
    overrun_factor: f64,
) -> i64 {
    (queue_position as f64 * avg_consult_minutes as f64 * overrun_factor).round() as i64
}

pub struct WaitEstimatorService {
    supabase: Arc<SupabaseClient>,
    overrun_config: OverrunConfig,
}

impl WaitEstimatorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
            overrun_config: OverrunConfig::default(),
        }
    }

    pub async fn get_wait_estimate(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<WaitEstimate, WaittimeError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let is_party = requester.id == appointment.patient_id.to_string()
            || requester.id == appointment.doctor_id.to_string();
        if !requester.is_admin() && !is_party {
            return Err(WaittimeError::Unauthorized);
        }

        if appointment.status.is_terminal() {
            return Err(WaittimeError::NotEstimable(format!(
                "appointment is {}",
                appointment.status
            )));
        }

        let avg_consult_minutes = self
            .get_doctor_avg_minutes(appointment.doctor_id, auth_token)
            .await?;
        let overrun_factor = self
            .get_overrun_factor(&appointment, auth_token)
            .await?;

        let now = Utc::now();

        if appointment.status == AppointmentStatus::Started {
            return Ok(WaitEstimate {
                appointment_id,
                status: WaitStatus::InConsultation,
                queue_position: 0,
                estimated_wait_minutes: 0,
                minutes_until_start: None,
                avg_consult_minutes,
                overrun_factor,
                computed_at: now,
            });
        }

        // Ahead of the scheduled start there is no queue to stand in yet;
        // the countdown to the slot is the whole answer.
        if now < appointment.start_ts {
            let minutes_until = (appointment.start_ts - now).num_minutes();
            return Ok(WaitEstimate {
                appointment_id,
                status: WaitStatus::Scheduled,
                queue_position: 0,
                estimated_wait_minutes: minutes_until,
                minutes_until_start: Some(minutes_until),
                avg_consult_minutes,
                overrun_factor,
                computed_at: now,
            });
        }

        let same_day = self.get_same_day_queue(&appointment, auth_token).await?;
        let position = queue_position(&appointment, &same_day);
        let wait = estimated_wait_minutes(position, avg_consult_minutes, overrun_factor);

        let status = if appointment.checked_in_at.is_some() {
            WaitStatus::Waiting
        } else {
            WaitStatus::Scheduled
        };

        debug!(
            "Wait estimate for appointment {}: position {}, {} minutes (avg {}, factor {})",
            appointment_id, position, wait, avg_consult_minutes, overrun_factor
        );

        Ok(WaitEstimate {
            appointment_id,
            status,
            queue_position: position,
            estimated_wait_minutes: wait,
            minutes_until_start: None,
            avg_consult_minutes,
            overrun_factor,
            computed_at: Utc::now(),
        })
    }

    async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, WaittimeError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                None,
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or(WaittimeError::AppointmentNotFound)
    }

    async fn get_same_day_queue(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, WaittimeError> {
        let day_start = appointment
            .start_ts
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| WaittimeError::DatabaseError("invalid day bounds".to_string()))?;
        let day_end = day_start + Duration::days(1);

        let start_enc = urlencoding::encode(&day_start.to_rfc3339()).to_string();
        let end_enc = urlencoding::encode(&day_end.to_rfc3339()).to_string();

        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&start_ts=gte.{}&start_ts=lt.{}&status=neq.completed",
                    appointment.doctor_id, start_enc, end_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        Ok(rows)
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

    /// Bucket lookup by (doctor, weekday, hour of day). Missing buckets fall
    /// back to the configured default; stored factors below 1.0 are clamped.
    async fn get_overrun_factor(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<f64, WaittimeError> {
        let weekday = appointment.start_ts.weekday().num_days_from_monday();
        let hour = appointment.start_ts.hour();

        let rows: Vec<OverrunEstimate> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/overrun_estimates?doctor_id=eq.{}&weekday=eq.{}&hour_of_day=eq.{}",
                    appointment.doctor_id, weekday, hour
                ),
                Some(auth_token),
                None,
            )
            .await?;

        let factor = rows
            .into_iter()
            .next()
            .map(|bucket| bucket.overrun_factor)
            .unwrap_or(self.overrun_config.default_overrun_factor);

        Ok(factor.max(1.0))
    }
}
