use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use booking_cell::models::Appointment;
use schedule_cell::models::{Clinic, Doctor};
use schedule_cell::services::slots::SlotListingService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{CascadeConfig, CascadeError, RescheduleAlternative};

const EARTH_RADIUS_KM: f64 = 6371.0;

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().asin()
}

/// Order alternatives for presentation. Within the time-dominance window
/// the smallest schedule shift wins, distance breaking ties; alternatives
/// shifted further than the window are ranked by distance instead, and
/// always sort after the in-window ones.
pub fn rank_alternatives(
    mut alternatives: Vec<RescheduleAlternative>,
    time_dominance_minutes: i64,
) -> Vec<RescheduleAlternative> {
    let cmp_f64 = |a: f64, b: f64| a.partial_cmp(&b).unwrap_or(Ordering::Equal);

    alternatives.sort_by(|a, b| {
        let a_near = a.time_delta_minutes.abs() <= time_dominance_minutes;
        let b_near = b.time_delta_minutes.abs() <= time_dominance_minutes;

        match (a_near, b_near) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => a
                .time_delta_minutes
                .abs()
                .cmp(&b.time_delta_minutes.abs())
                .then(cmp_f64(a.distance_km, b.distance_km)),
            (false, false) => cmp_f64(a.distance_km, b.distance_km)
                .then(a.time_delta_minutes.abs().cmp(&b.time_delta_minutes.abs())),
        }
    });

    alternatives
}

/// Finds replacement slots for one displaced appointment: same specialty,
/// same calendar date, clinics within the search radius.
pub struct AlternativeSearchService {
    supabase: Arc<SupabaseClient>,
    config: CascadeConfig,
}

impl AlternativeSearchService {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_client(Arc::new(SupabaseClient::new(config)))
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            config: CascadeConfig::default(),
        }
    }

    pub async fn find_alternatives(
        &self,
        original: &Appointment,
        auth_token: &str,
    ) -> Result<Vec<RescheduleAlternative>, CascadeError> {
        let origin = self.get_clinic(original.clinic_id, auth_token).await?;
        let specialty = self
            .get_doctor(original.doctor_id, auth_token)
            .await?
            .specialty;

        let candidates = self
            .get_candidate_doctors(&specialty, original.doctor_id, auth_token)
            .await?;
        let nearby = self.get_nearby_clinics(&origin, auth_token).await?;

        if candidates.is_empty() || nearby.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(Doctor, Clinic, f64)> = candidates
            .iter()
            .flat_map(|doctor| {
                nearby.iter().map(move |(clinic, distance)| {
                    (doctor.clone(), clinic.clone(), *distance)
                })
            })
            .collect();

        debug!(
            "Searching {} doctor/clinic pairs for appointment {}",
            pairs.len(),
            original.id
        );

        let date = original.start_ts.date_naive();
        let timeout = StdDuration::from_millis(self.config.candidate_timeout_ms);

        let alternatives: Vec<RescheduleAlternative> = stream::iter(pairs)
            .map(|(doctor, clinic, distance)| {
                let slots = SlotListingService::with_client(Arc::clone(&self.supabase));
                async move {
                    let lookup =
                        slots.list_bookable_slots(doctor.id, clinic.id, date, auth_token);

                    match tokio::time::timeout(timeout, lookup).await {
                        Ok(Ok(found)) => found
                            .into_iter()
                            .map(|slot| RescheduleAlternative {
                                doctor_id: doctor.id,
                                doctor_name: doctor.full_name.clone(),
                                clinic_id: clinic.id,
                                clinic_name: clinic.name.clone(),
                                start_ts: slot.start_ts,
                                end_ts: slot.end_ts,
                                time_delta_minutes: (slot.start_ts - original.start_ts)
                                    .num_minutes(),
                                distance_km: distance,
                            })
                            .collect(),
                        Ok(Err(err)) => {
                            warn!(
                                "Slot lookup failed for doctor {} at clinic {}: {}",
                                doctor.id, clinic.id, err
                            );
                            Vec::new()
                        }
                        Err(_) => {
                            warn!(
                                "Slot lookup timed out for doctor {} at clinic {}",
                                doctor.id, clinic.id
                            );
                            Vec::new()
                        }
                    }
                }
            })
            .buffer_unordered(self.config.fanout_limit)
            .collect::<Vec<Vec<RescheduleAlternative>>>()
            .await
            .into_iter()
            .flatten()
            // A slot in the past is never a valid offer.
            .filter(|alt| alt.start_ts > Utc::now())
            .collect();

        let mut ranked =
            rank_alternatives(alternatives, self.config.time_dominance_minutes);
        ranked.truncate(self.config.max_alternatives);

        Ok(ranked)
    }

    async fn get_clinic(&self, clinic_id: Uuid, auth_token: &str) -> Result<Clinic, CascadeError> {
        let rows: Vec<Clinic> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/clinics?id=eq.{}", clinic_id),
                Some(auth_token),
                None,
            )
            .await?;

        rows.into_iter().next().ok_or(CascadeError::ClinicNotFound)
    }

    async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, CascadeError> {
        let rows: Vec<Doctor> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/doctors?id=eq.{}", doctor_id),
                Some(auth_token),
                None,
            )
            .await?;

        rows.into_iter().next().ok_or(CascadeError::DoctorNotFound)
    }

    async fn get_candidate_doctors(
        &self,
        specialty: &str,
        exclude: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, CascadeError> {
        let rows: Vec<Doctor> = self
            .supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/doctors?specialty=eq.{}&id=neq.{}",
                    urlencoding::encode(specialty),
                    exclude
                ),
                Some(auth_token),
                None,
            )
            .await?;

        Ok(rows)
    }

    async fn get_nearby_clinics(
        &self,
        origin: &Clinic,
        auth_token: &str,
    ) -> Result<Vec<(Clinic, f64)>, CascadeError> {
        let rows: Vec<Clinic> = self
            .supabase
            .request(Method::GET, "/rest/v1/clinics", Some(auth_token), None)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|clinic| {
                let distance = haversine_km(
                    origin.latitude,
                    origin.longitude,
                    clinic.latitude,
                    clinic.longitude,
                );
                (distance <= self.config.max_radius_km).then_some((clinic, distance))
            })
            .collect())
    }
}
