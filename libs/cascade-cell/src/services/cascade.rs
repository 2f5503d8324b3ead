use std::sync::Arc;

use futures::stream::{self, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use booking_cell::models::{Appointment, RescheduleRequest};
use booking_cell::services::booking::BookingService;
use booking_cell::services::events::NotificationPublisher;
use schedule_cell::models::ScheduleBlock;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    AppointmentCascadeOutcome, CascadeConfig, CascadeError, CascadeResult, RescheduleDecision,
    RescheduleOptionsEvent, UnavailabilityRequest,
};
use crate::services::search::AlternativeSearchService;

/// Orchestrates an emergency leave: record the unavailability, park every
/// displaced appointment, and offer each patient ranked alternatives. The
/// cascade is deliberately not transactional across patients; one failed
/// appointment never blocks the rest.
pub struct CascadeService {
    supabase: Arc<SupabaseClient>,
    search: AlternativeSearchService,
    booking: BookingService,
    notifier: NotificationPublisher,
    config: CascadeConfig,
}

impl CascadeService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        Self {
            search: AlternativeSearchService::with_client(Arc::clone(&supabase)),
            booking: BookingService::new(config),
            notifier: NotificationPublisher::new(config, Arc::clone(&supabase)),
            supabase,
            config: CascadeConfig::default(),
        }
    }

    pub async fn handle_unavailability(
        &self,
        doctor_id: Uuid,
        requester: &User,
        request: UnavailabilityRequest,
        auth_token: &str,
    ) -> Result<CascadeResult, CascadeError> {
        if !requester.is_admin() && requester.id != doctor_id.to_string() {
            return Err(CascadeError::Unauthorized);
        }

        if request.start_ts >= request.end_ts {
            return Err(CascadeError::InvalidInterval(
                "leave start must precede its end".to_string(),
            ));
        }

        self.record_leave_block(doctor_id, &request, auth_token)
            .await?;

        let affected = self
            .get_displaced_appointments(doctor_id, &request, auth_token)
            .await?;

        info!(
            "Emergency leave for doctor {} from {} to {}: {} appointments displaced",
            doctor_id,
            request.start_ts,
            request.end_ts,
            affected.len()
        );

        if affected.is_empty() {
            return Ok(CascadeResult {
                affected_count: 0,
                outcomes: Vec::new(),
            });
        }

        let reason = request.reason.clone();
        let outcomes: Vec<AppointmentCascadeOutcome> = stream::iter(affected)
            .map(|appointment| self.cascade_one(appointment, reason.clone(), auth_token))
            .buffer_unordered(self.config.fanout_limit)
            .collect()
            .await;

        Ok(CascadeResult {
            affected_count: outcomes.len(),
            outcomes,
        })
    }

    /// Park one appointment and offer its patient alternatives. Failures
    /// are folded into the outcome instead of propagating.
    async fn cascade_one(
        &self,
        appointment: Appointment,
        reason: Option<String>,
        auth_token: &str,
    ) -> AppointmentCascadeOutcome {
        if let Err(err) = self
            .booking
            .mark_pending_decision(appointment.id, auth_token)
            .await
        {
            // Typically an in-progress visit, which only the doctor can
            // resolve in person.
            warn!(
                "Appointment {} could not be parked for a decision: {}",
                appointment.id, err
            );
            return AppointmentCascadeOutcome {
                appointment_id: appointment.id,
                patient_id: appointment.patient_id,
                alternatives: Vec::new(),
                error: Some(err.to_string()),
            };
        }

        let (alternatives, error) = match self
            .search
            .find_alternatives(&appointment, auth_token)
            .await
        {
            Ok(found) => (found, None),
            Err(err) => {
                warn!(
                    "Alternative search failed for appointment {}: {}",
                    appointment.id, err
                );
                (Vec::new(), Some(err.to_string()))
            }
        };

        self.notifier
            .send_event(
                "emergency_reschedule_options",
                &RescheduleOptionsEvent {
                    event_type: "emergency_reschedule_options",
                    appointment_id: appointment.id,
                    patient_id: appointment.patient_id,
                    doctor_id: appointment.doctor_id,
                    reason,
                    alternatives: alternatives.clone(),
                },
            )
            .await;

        AppointmentCascadeOutcome {
            appointment_id: appointment.id,
            patient_id: appointment.patient_id,
            alternatives,
            error,
        }
    }

    /// Patient resolves a parked appointment. Accepting a slot runs through
    /// the regular booking critical section, so a stale offer surfaces as a
    /// conflict; cancelling takes the ordinary cancellation path.
    pub async fn confirm_reschedule(
        &self,
        appointment_id: Uuid,
        requester: &User,
        decision: RescheduleDecision,
        auth_token: &str,
    ) -> Result<Appointment, CascadeError> {
        match decision {
            RescheduleDecision::Accept {
                doctor_id,
                clinic_id,
                start_ts,
                end_ts,
            } => {
                let replacement = self
                    .booking
                    .reschedule_appointment(
                        appointment_id,
                        requester,
                        RescheduleRequest {
                            new_start_ts: start_ts,
                            new_end_ts: end_ts,
                            new_doctor_id: Some(doctor_id),
                            new_clinic_id: Some(clinic_id),
                        },
                        auth_token,
                    )
                    .await?;

                info!(
                    "Patient accepted reschedule of {} to {} with doctor {}",
                    appointment_id, replacement.start_ts, replacement.doctor_id
                );

                Ok(replacement)
            }
            RescheduleDecision::Cancel => {
                let cancelled = self
                    .booking
                    .cancel_appointment(appointment_id, requester, auth_token)
                    .await?;

                info!(
                    "Patient declined all reschedule offers for {}; appointment cancelled",
                    appointment_id
                );

                Ok(cancelled)
            }
        }
    }

    /// Emergency leave is written as a `holiday` block directly: unlike a
    /// planned block it may overlay existing work blocks, so it skips the
    /// overlap guard.
    async fn record_leave_block(
        &self,
        doctor_id: Uuid,
        request: &UnavailabilityRequest,
        auth_token: &str,
    ) -> Result<ScheduleBlock, CascadeError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<ScheduleBlock> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/schedule_blocks",
                Some(auth_token),
                Some(json!({
                    "doctor_id": doctor_id,
                    "clinic_id": request.clinic_id,
                    "block_type": "holiday",
                    "start_ts": request.start_ts,
                    "end_ts": request.end_ts,
                })),
                Some(headers),
            )
            .await?;

        rows.into_iter().next().ok_or_else(|| {
            CascadeError::DatabaseError("leave block insert returned no row".to_string())
        })
    }

    async fn get_displaced_appointments(
        &self,
        doctor_id: Uuid,
        request: &UnavailabilityRequest,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, CascadeError> {
        let start_enc = urlencoding::encode(&request.start_ts.to_rfc3339()).to_string();
        let end_enc = urlencoding::encode(&request.end_ts.to_rfc3339()).to_string();

        let rows: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&status=in.(confirmed,started)&start_ts=lt.{}&end_ts=gt.{}&order=start_ts.asc",
                    doctor_id, end_enc, start_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        Ok(rows)
    }
}
