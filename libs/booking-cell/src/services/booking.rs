use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{SupabaseClient, SupabaseError};
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentStatus, BookingError, ConfirmBookingRequest, DirectBookingRequest,
    RescheduleRequest, VisitType,
};
use crate::services::events::NotificationPublisher;
use crate::services::holds::SlotHoldService;
use crate::services::lifecycle::AppointmentLifecycleService;

const SLOT_LOCK_TTL_SECONDS: i64 = 30;

/// Coordinates the slot-booking transaction. Every path that writes a
/// `confirmed` appointment goes through the same critical section: acquire
/// the per-slot lock, re-check for a blocking appointment, insert, release.
/// The partial unique index on `(doctor_id, start_ts)` backs the lock up,
/// so even a lost lock cannot produce a double booking.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    holds: SlotHoldService,
    notifier: NotificationPublisher,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            holds: SlotHoldService::with_client(supabase.clone()),
            notifier: NotificationPublisher::new(config, supabase.clone()),
            supabase,
        }
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn slot_lock_key(doctor_id: Uuid, start_ts: DateTime<Utc>) -> String {
        format!("slot:{}:{}", doctor_id, start_ts.timestamp())
    }

    /// Confirm a held slot into a real appointment. The hold must be live
    /// and belong to the confirming patient.
    pub async fn confirm_from_hold(
        &self,
        patient_id: Uuid,
        request: ConfirmBookingRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let hold = self
            .holds
            .get_hold(request.hold_id, auth_token)
            .await?
            .ok_or(BookingError::HoldNotFound)?;

        if !hold.is_live(Utc::now()) {
            warn!("Confirm refused: hold {} is no longer live", hold.id);
            return Err(BookingError::HoldExpired);
        }

        if let Some(owner) = hold.patient_id {
            if owner != patient_id {
                return Err(BookingError::HoldOwnershipMismatch);
            }
        }

        let appointment = self
            .book_slot(
                patient_id,
                hold.doctor_id,
                hold.clinic_id,
                request.visit_type,
                hold.start_ts,
                hold.end_ts,
                request.address,
                request.fee,
                None,
                auth_token,
            )
            .await?;

        if let Err(err) = self.holds.consume_hold(hold.id, auth_token).await {
            // The slot is booked either way; a stale hold row is harmless.
            warn!("Failed to mark hold {} consumed: {}", hold.id, err);
        }

        self.notifier
            .spawn_booking_confirmed(appointment.clone(), auth_token);

        info!(
            "Confirmed appointment {} from hold {} for patient {}",
            appointment.id, hold.id, patient_id
        );

        Ok(appointment)
    }

    /// Staff-initiated booking that skips the hold stage but runs the same
    /// critical section as a hold-based confirm.
    pub async fn create_direct_appointment(
        &self,
        requester: &User,
        request: DirectBookingRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        if !requester.is_admin() && requester.id != request.doctor_id.to_string() {
            return Err(BookingError::Unauthorized);
        }

        if request.start_ts >= request.end_ts {
            return Err(BookingError::InvalidTime(
                "appointment start must precede its end".to_string(),
            ));
        }

        let appointment = self
            .book_slot(
                request.patient_id,
                request.doctor_id,
                request.clinic_id,
                request.visit_type,
                request.start_ts,
                request.end_ts,
                request.address,
                request.fee,
                None,
                auth_token,
            )
            .await?;

        self.notifier
            .spawn_booking_confirmed(appointment.clone(), auth_token);

        info!(
            "Direct appointment {} created for patient {} by {}",
            appointment.id, request.patient_id, requester.id
        );

        Ok(appointment)
    }

    /// The critical section shared by every confirm path.
    #[allow(clippy::too_many_arguments)]
    async fn book_slot(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        clinic_id: Uuid,
        visit_type: VisitType,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
        address: Option<String>,
        fee: Option<f64>,
        rescheduled_from: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let lock_key = Self::slot_lock_key(doctor_id, start_ts);

        if !self.acquire_slot_lock(&lock_key, auth_token).await? {
            warn!("Slot lock {} contended, rejecting booking", lock_key);
            return Err(BookingError::SlotBookedByAnother);
        }

        let result = self
            .insert_if_slot_free(
                patient_id,
                doctor_id,
                clinic_id,
                visit_type,
                start_ts,
                end_ts,
                address,
                fee,
                rescheduled_from,
                auth_token,
            )
            .await;

        if let Err(err) = self.release_slot_lock(&lock_key, auth_token).await {
            // The lock expires on its own after the TTL.
            warn!("Failed to release slot lock {}: {}", lock_key, err);
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_if_slot_free(
        &self,
        patient_id: Uuid,
        doctor_id: Uuid,
        clinic_id: Uuid,
        visit_type: VisitType,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
        address: Option<String>,
        fee: Option<f64>,
        rescheduled_from: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let start_enc = urlencoding::encode(&start_ts.to_rfc3339()).to_string();

        let blocking: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&start_ts=eq.{}&status=in.(confirmed,started)&select=id",
                    doctor_id, start_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        if !blocking.is_empty() {
            return Err(BookingError::SlotBookedByAnother);
        }

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(json!({
                    "patient_id": patient_id,
                    "doctor_id": doctor_id,
                    "clinic_id": clinic_id,
                    "visit_type": visit_type,
                    "status": "confirmed",
                    "start_ts": start_ts,
                    "end_ts": end_ts,
                    "address": address,
                    "fee": fee,
                    "rescheduled_from": rescheduled_from,
                })),
                Some(Self::representation_headers()),
            )
            .await?;

        rows.into_iter().next().ok_or_else(|| {
            BookingError::DatabaseError("appointment insert returned no row".to_string())
        })
    }

    /// Take the advisory lock for one slot. Expired locks under the same key
    /// are swept first so a crashed holder cannot wedge the slot.
    async fn acquire_slot_lock(
        &self,
        lock_key: &str,
        auth_token: &str,
    ) -> Result<bool, BookingError> {
        let now_enc = urlencoding::encode(&Utc::now().to_rfc3339()).to_string();

        let _swept: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &format!(
                    "/rest/v1/slot_locks?lock_key=eq.{}&expires_at=lt.{}",
                    urlencoding::encode(lock_key),
                    now_enc
                ),
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await?;

        let expires_at = Utc::now() + Duration::seconds(SLOT_LOCK_TTL_SECONDS);

        let attempt: Result<Vec<Value>, SupabaseError> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/slot_locks",
                Some(auth_token),
                Some(json!({
                    "lock_key": lock_key,
                    "expires_at": expires_at,
                })),
                Some(Self::representation_headers()),
            )
            .await;

        match attempt {
            Ok(_) => {
                debug!("Acquired slot lock {}", lock_key);
                Ok(true)
            }
            Err(SupabaseError::Conflict(_)) => Ok(false),
            Err(other) => Err(other.into()),
        }
    }

    async fn release_slot_lock(
        &self,
        lock_key: &str,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let _released: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &format!(
                    "/rest/v1/slot_locks?lock_key=eq.{}",
                    urlencoding::encode(lock_key)
                ),
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await?;

        debug!("Released slot lock {}", lock_key);
        Ok(())
    }

    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
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
            .ok_or(BookingError::AppointmentNotFound)
    }

    /// Record patient arrival. Check-in does not change status; it only
    /// stamps `checked_in_at`, which moves the patient into the live queue.
    pub async fn check_in(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if !requester.is_admin() && requester.id != appointment.patient_id.to_string() {
            return Err(BookingError::Unauthorized);
        }

        if appointment.status != AppointmentStatus::Confirmed {
            return Err(BookingError::ValidationError(format!(
                "cannot check in an appointment in status {}",
                appointment.status
            )));
        }

        self.update_appointment(
            appointment_id,
            json!({ "checked_in_at": Utc::now() }),
            auth_token,
        )
        .await
    }

    pub async fn start_consultation(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if !requester.is_admin() && requester.id != appointment.doctor_id.to_string() {
            return Err(BookingError::Unauthorized);
        }

        AppointmentLifecycleService::validate_status_transition(
            appointment.status,
            AppointmentStatus::Started,
        )?;

        info!("Starting consultation for appointment {}", appointment_id);

        self.update_appointment(
            appointment_id,
            json!({ "status": "started", "consult_started_at": Utc::now() }),
            auth_token,
        )
        .await
    }

    /// Complete a consultation. The doctor's rolling average consult length
    /// is recomputed in the background; estimates tolerate it lagging.
    pub async fn end_consultation(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        if !requester.is_admin() && requester.id != appointment.doctor_id.to_string() {
            return Err(BookingError::Unauthorized);
        }

        AppointmentLifecycleService::validate_status_transition(
            appointment.status,
            AppointmentStatus::Completed,
        )?;

        let updated = self
            .update_appointment(
                appointment_id,
                json!({ "status": "completed", "consult_ended_at": Utc::now() }),
                auth_token,
            )
            .await?;

        let supabase = self.supabase.clone();
        let doctor_id = appointment.doctor_id;
        let token = auth_token.to_string();
        tokio::spawn(async move {
            if let Err(err) = Self::recompute_rolling_average(supabase, doctor_id, &token).await {
                warn!(
                    "Rolling average recompute failed for doctor {}: {}",
                    doctor_id, err
                );
            }
        });

        info!("Completed consultation for appointment {}", appointment_id);

        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        requester: &User,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        let is_party = requester.id == appointment.patient_id.to_string()
            || requester.id == appointment.doctor_id.to_string();
        if !requester.is_admin() && !is_party {
            return Err(BookingError::Unauthorized);
        }

        AppointmentLifecycleService::validate_status_transition(
            appointment.status,
            AppointmentStatus::Cancelled,
        )?;

        info!(
            "Cancelling appointment {} (was {})",
            appointment_id, appointment.status
        );

        self.update_appointment(appointment_id, json!({ "status": "cancelled" }), auth_token)
            .await
    }

    /// Move an appointment to a new slot. The original record is kept and
    /// marked `rescheduled`; a fresh `confirmed` appointment is created for
    /// the new slot through the usual critical section.
    pub async fn reschedule_appointment(
        &self,
        appointment_id: Uuid,
        requester: &User,
        request: RescheduleRequest,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let original = self.get_appointment(appointment_id, auth_token).await?;

        let is_party = requester.id == original.patient_id.to_string()
            || requester.id == original.doctor_id.to_string();
        if !requester.is_admin() && !is_party {
            return Err(BookingError::Unauthorized);
        }

        AppointmentLifecycleService::validate_status_transition(
            original.status,
            AppointmentStatus::Rescheduled,
        )?;

        if request.new_start_ts >= request.new_end_ts {
            return Err(BookingError::InvalidTime(
                "rescheduled start must precede its end".to_string(),
            ));
        }

        let replacement = self
            .book_slot(
                original.patient_id,
                request.new_doctor_id.unwrap_or(original.doctor_id),
                request.new_clinic_id.unwrap_or(original.clinic_id),
                original.visit_type,
                request.new_start_ts,
                request.new_end_ts,
                original.address.clone(),
                original.fee,
                Some(original.id),
                auth_token,
            )
            .await?;

        self.update_appointment(appointment_id, json!({ "status": "rescheduled" }), auth_token)
            .await?;

        info!(
            "Rescheduled appointment {} to {} ({} -> {})",
            original.id, replacement.id, original.start_ts, replacement.start_ts
        );

        Ok(replacement)
    }

    /// Park an appointment while its patient decides between reschedule
    /// alternatives. Only reachable from `confirmed`.
    pub async fn mark_pending_decision(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;

        AppointmentLifecycleService::validate_status_transition(
            appointment.status,
            AppointmentStatus::PendingPatientDecision,
        )?;

        self.update_appointment(
            appointment_id,
            json!({ "status": "pending_patient_decision" }),
            auth_token,
        )
        .await
    }

    async fn update_appointment(
        &self,
        appointment_id: Uuid,
        body: Value,
        auth_token: &str,
    ) -> Result<Appointment, BookingError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                Some(body),
                Some(Self::representation_headers()),
            )
            .await?;

        rows.into_iter()
            .next()
            .ok_or(BookingError::AppointmentNotFound)
    }

    /// Mean consult length over the doctor's most recent completed visits,
    /// written back to `doctors.avg_consult_minutes`.
    async fn recompute_rolling_average(
        supabase: Arc<SupabaseClient>,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), BookingError> {
        let completed: Vec<Appointment> = supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&status=eq.completed&consult_started_at=not.is.null&consult_ended_at=not.is.null&order=consult_ended_at.desc&limit=50",
                    doctor_id
                ),
                Some(auth_token),
                None,
            )
            .await?;

        let durations: Vec<i64> = completed
            .iter()
            .filter_map(|a| match (a.consult_started_at, a.consult_ended_at) {
                (Some(start), Some(end)) if end > start => {
                    Some((end - start).num_seconds())
                }
                _ => None,
            })
            .collect();

        if durations.is_empty() {
            return Ok(());
        }

        let mean_minutes =
            (durations.iter().sum::<i64>() as f64 / durations.len() as f64 / 60.0).round() as i64;

        let _rows: Vec<Value> = supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/doctors?id=eq.{}", doctor_id),
                Some(auth_token),
                Some(json!({ "avg_consult_minutes": mean_minutes })),
                Some(Self::representation_headers()),
            )
            .await?;

        debug!(
            "Doctor {} rolling average updated to {} minutes over {} visits",
            doctor_id,
            mean_minutes,
            durations.len()
        );

        Ok(())
    }
}
