use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::Appointment;

/// Event emitted after a slot is successfully confirmed. Denormalized
/// doctor and clinic fields are filled on a best-effort basis so the
/// notification channel does not need its own lookups.
#[derive(Debug, Serialize)]
pub struct BookingConfirmedEvent {
    pub event_type: &'static str,
    pub appointment: Appointment,
    pub doctor_name: Option<String>,
    pub clinic_name: Option<String>,
    pub clinic_address: Option<String>,
}

/// Fire-and-forget publisher for domain events. Delivery failures are
/// logged and swallowed: a booking that committed must never be rolled
/// back or error out because a webhook was down.
#[derive(Clone)]
pub struct NotificationPublisher {
    supabase: Arc<SupabaseClient>,
    http: reqwest::Client,
    webhook_url: Option<String>,
}

impl NotificationPublisher {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            http: reqwest::Client::new(),
            webhook_url: config.notification_webhook_url.clone(),
        }
    }

    /// Publish a typed event to the configured webhook. Never fails the
    /// caller; all errors end up in the log.
    pub async fn send_event<T: Serialize>(&self, event_type: &str, event: &T) {
        let Some(url) = &self.webhook_url else {
            debug!("No notification webhook configured, dropping {}", event_type);
            return;
        };

        match self.http.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                info!("Published {} event", event_type);
            }
            Ok(response) => {
                warn!(
                    "Notification webhook rejected {} event: {}",
                    event_type,
                    response.status()
                );
            }
            Err(err) => {
                warn!("Failed to publish {} event: {}", event_type, err);
            }
        }
    }

    /// Spawn a detached task that enriches and publishes a
    /// `booking_confirmed` event. Returns immediately.
    pub fn spawn_booking_confirmed(&self, appointment: Appointment, auth_token: &str) {
        let publisher = self.clone();
        let token = auth_token.to_string();

        tokio::spawn(async move {
            let doctor_name = publisher
                .lookup_field(
                    &format!(
                        "/rest/v1/doctors?id=eq.{}&select=full_name",
                        appointment.doctor_id
                    ),
                    "full_name",
                    &token,
                )
                .await;

            let clinic = publisher
                .lookup_row(
                    &format!(
                        "/rest/v1/clinics?id=eq.{}&select=name,address",
                        appointment.clinic_id
                    ),
                    &token,
                )
                .await;

            let event = BookingConfirmedEvent {
                event_type: "booking_confirmed",
                doctor_name,
                clinic_name: clinic
                    .as_ref()
                    .and_then(|c| c.get("name"))
                    .and_then(Value::as_str)
                    .map(String::from),
                clinic_address: clinic
                    .as_ref()
                    .and_then(|c| c.get("address"))
                    .and_then(Value::as_str)
                    .map(String::from),
                appointment,
            };

            publisher.send_event("booking_confirmed", &event).await;
        });
    }

    async fn lookup_row(&self, path: &str, auth_token: &str) -> Option<Value> {
        match self
            .supabase
            .request::<Vec<Value>>(Method::GET, path, Some(auth_token), None)
            .await
        {
            Ok(rows) => rows.into_iter().next(),
            Err(err) => {
                warn!("Event enrichment lookup failed: {}", err);
                None
            }
        }
    }

    async fn lookup_field(&self, path: &str, field: &str, auth_token: &str) -> Option<String> {
        self.lookup_row(path, auth_token)
            .await
            .and_then(|row| row.get(field).and_then(Value::as_str).map(String::from))
    }
}
