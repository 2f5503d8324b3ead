use std::sync::Arc;

use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{BookingError, CreateHoldRequest, HoldReceipt, SlotHold};

#[derive(Debug, Clone)]
pub struct HoldConfig {
    pub ttl_seconds: i64,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self { ttl_seconds: 120 }
    }
}

/// Manages short-lived slot reservations. A hold gives one patient a window
/// to complete checkout without the slot being sold twice underneath them;
/// it is advisory for slot listings and mandatory for hold-based confirms.
pub struct SlotHoldService {
    supabase: Arc<SupabaseClient>,
    config: HoldConfig,
}

impl SlotHoldService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            config: HoldConfig::default(),
        }
    }

    pub fn with_hold_config(mut self, config: HoldConfig) -> Self {
        self.config = config;
        self
    }

    fn representation_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    /// Place a hold on a concrete slot. Fails fast if a blocking appointment
    /// or another live hold already occupies the slot start.
    pub async fn create_hold(
        &self,
        patient_id: Uuid,
        request: CreateHoldRequest,
        auth_token: &str,
    ) -> Result<HoldReceipt, BookingError> {
        if request.start_ts >= request.end_ts {
            return Err(BookingError::InvalidTime(
                "hold start must precede its end".to_string(),
            ));
        }

        let start_enc = urlencoding::encode(&request.start_ts.to_rfc3339()).to_string();

        let booked: Vec<Value> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/appointments?doctor_id=eq.{}&start_ts=eq.{}&status=in.(confirmed,started)&select=id",
                    request.doctor_id, start_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        if !booked.is_empty() {
            warn!(
                "Hold refused for doctor {} at {}: slot already booked",
                request.doctor_id, request.start_ts
            );
            return Err(BookingError::SlotAlreadyBooked);
        }

        let now = Utc::now();
        let now_enc = urlencoding::encode(&now.to_rfc3339()).to_string();

        let live_holds: Vec<SlotHold> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/slot_holds?doctor_id=eq.{}&start_ts=eq.{}&status=eq.active&ttl_expires_at=gt.{}",
                    request.doctor_id, start_enc, now_enc
                ),
                Some(auth_token),
                None,
            )
            .await?;

        // At most one live hold per (doctor, start_ts), no matter who owns
        // it; a patient retrying must wait out their own hold too.
        if !live_holds.is_empty() {
            warn!(
                "Hold refused for doctor {} at {}: slot already held",
                request.doctor_id, request.start_ts
            );
            return Err(BookingError::SlotCurrentlyHeld);
        }

        let expires_at = now + Duration::seconds(self.config.ttl_seconds);

        let rows: Vec<SlotHold> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/slot_holds",
                Some(auth_token),
                Some(json!({
                    "doctor_id": request.doctor_id,
                    "clinic_id": request.clinic_id,
                    "patient_id": patient_id,
                    "start_ts": request.start_ts,
                    "end_ts": request.end_ts,
                    "status": "active",
                    "ttl_expires_at": expires_at,
                })),
                Some(Self::representation_headers()),
            )
            .await?;

        let hold = rows
            .into_iter()
            .next()
            .ok_or_else(|| BookingError::DatabaseError("hold insert returned no row".to_string()))?;

        info!(
            "Created hold {} for patient {} on doctor {} at {}",
            hold.id, patient_id, request.doctor_id, request.start_ts
        );

        Ok(HoldReceipt {
            hold_id: hold.id,
            expires_at,
            expires_in_seconds: self.config.ttl_seconds,
        })
    }

    pub async fn get_hold(
        &self,
        hold_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<SlotHold>, BookingError> {
        let rows: Vec<SlotHold> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/slot_holds?id=eq.{}", hold_id),
                Some(auth_token),
                None,
            )
            .await?;

        Ok(rows.into_iter().next())
    }

    /// Flip a hold to `consumed` after its slot has been confirmed. The hold
    /// no longer blocks anything either way; this is bookkeeping.
    pub async fn consume_hold(&self, hold_id: Uuid, auth_token: &str) -> Result<(), BookingError> {
        let _rows: Vec<SlotHold> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &format!("/rest/v1/slot_holds?id=eq.{}", hold_id),
                Some(auth_token),
                Some(json!({ "status": "consumed" })),
                Some(Self::representation_headers()),
            )
            .await?;

        debug!("Hold {} consumed", hold_id);
        Ok(())
    }

    /// Delete stale hold rows. Correctness never depends on this running:
    /// expiry is enforced at read time by every consumer. Pure hygiene.
    pub async fn purge_expired_holds(&self, auth_token: &str) -> Result<usize, BookingError> {
        let now_enc = urlencoding::encode(&Utc::now().to_rfc3339()).to_string();

        let purged: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::DELETE,
                &format!(
                    "/rest/v1/slot_holds?status=eq.active&ttl_expires_at=lt.{}",
                    now_enc
                ),
                Some(auth_token),
                None,
                Some(Self::representation_headers()),
            )
            .await?;

        if !purged.is_empty() {
            info!("Purged {} expired slot holds", purged.len());
        }

        Ok(purged.len())
    }
}
