// libs/cascade-cell/tests/cascade_test.rs
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::AppointmentStatus;
use cascade_cell::models::{CascadeError, RescheduleDecision, UnavailabilityRequest};
use cascade_cell::services::cascade::CascadeService;
use shared_models::auth::User;
use shared_utils::test_utils::TestConfig;

fn leave_request(clinic_id: Uuid) -> UnavailabilityRequest {
    UnavailabilityRequest {
        clinic_id,
        start_ts: Utc.with_ymd_and_hms(2026, 9, 7, 8, 0, 0).unwrap(),
        end_ts: Utc.with_ymd_and_hms(2026, 9, 7, 18, 0, 0).unwrap(),
        reason: Some("family emergency".to_string()),
    }
}

fn doctor_user(doctor_id: Uuid) -> User {
    User {
        id: doctor_id.to_string(),
        email: None,
        role: Some("doctor".to_string()),
        created_at: None,
    }
}

fn holiday_block_row(doctor_id: Uuid, clinic_id: Uuid) -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "doctor_id": doctor_id,
        "clinic_id": clinic_id,
        "block_type": "holiday",
        "start_ts": "2026-09-07T08:00:00Z",
        "end_ts": "2026-09-07T18:00:00Z",
        "slot_minutes": null,
        "buffer_minutes": null,
        "created_at": "2026-09-07T07:00:00Z",
        "updated_at": "2026-09-07T07:00:00Z"
    })
}

fn appointment_row(id: Uuid, patient_id: Uuid, doctor_id: Uuid, clinic_id: Uuid, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "doctor_id": doctor_id,
        "clinic_id": clinic_id,
        "visit_type": "follow_up",
        "status": status,
        "start_ts": "2026-09-07T10:00:00Z",
        "end_ts": "2026-09-07T10:30:00Z",
        "address": null,
        "fee": null,
        "checked_in_at": null,
        "consult_started_at": null,
        "consult_ended_at": null,
        "rescheduled_from": null,
        "created_at": "2026-09-01T08:00:00Z",
        "updated_at": "2026-09-01T08:00:00Z"
    })
}

fn clinic_row(clinic_id: Uuid) -> serde_json::Value {
    json!({
        "id": clinic_id,
        "name": "Main Street Clinic",
        "address": "1 Main St",
        "latitude": 48.85,
        "longitude": 2.35,
        "timezone": "Europe/Paris"
    })
}

#[tokio::test]
async fn leave_with_no_displaced_appointments_returns_early() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![holiday_block_row(doctor_id, clinic_id)]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = CascadeService::new(&config);

    let result = service
        .handle_unavailability(
            doctor_id,
            &doctor_user(doctor_id),
            leave_request(clinic_id),
            "token",
        )
        .await
        .expect("cascade should succeed");

    assert_eq!(result.affected_count, 0);
    assert!(result.outcomes.is_empty());
}

#[tokio::test]
async fn displaced_appointment_is_parked_for_a_decision() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![holiday_block_row(doctor_id, clinic_id)]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "confirmed",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "confirmed",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "pending_patient_decision",
        )]))
        .expect(1)
        .mount(&server)
        .await;

    // Origin clinic lookup and radius search share this mock; the origin
    // itself is the only clinic in range.
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinics"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![clinic_row(clinic_id)]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": doctor_id,
            "full_name": "Dr. Away",
            "specialty": "dermatology",
            "avg_consult_minutes": 20
        })]))
        .mount(&server)
        .await;

    // No colleagues with the same specialty: alternatives come back empty
    // but the patient is still asked to decide.
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("specialty", "eq.dermatology"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = CascadeService::new(&config);

    let result = service
        .handle_unavailability(
            doctor_id,
            &doctor_user(doctor_id),
            leave_request(clinic_id),
            "token",
        )
        .await
        .expect("cascade should succeed");

    assert_eq!(result.affected_count, 1);
    let outcome = &result.outcomes[0];
    assert_eq!(outcome.appointment_id, appointment_id);
    assert_eq!(outcome.patient_id, patient_id);
    assert!(outcome.alternatives.is_empty());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn in_progress_appointment_is_reported_not_parked() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![holiday_block_row(doctor_id, clinic_id)]),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "started",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "started",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = CascadeService::new(&config);

    let result = service
        .handle_unavailability(
            doctor_id,
            &doctor_user(doctor_id),
            leave_request(clinic_id),
            "token",
        )
        .await
        .expect("cascade itself should succeed");

    assert_eq!(result.affected_count, 1);
    assert!(result.outcomes[0].error.is_some());
    assert!(result.outcomes[0].alternatives.is_empty());
}

#[tokio::test]
async fn leave_block_lands_without_consulting_existing_blocks() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    // Emergency leave overlays whatever blocks already exist, so the write
    // must never be preceded by a block lookup.
    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(vec![holiday_block_row(doctor_id, clinic_id)]),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = CascadeService::new(&config);

    let result = service
        .handle_unavailability(
            doctor_id,
            &doctor_user(doctor_id),
            leave_request(clinic_id),
            "token",
        )
        .await
        .expect("cascade should succeed");

    assert_eq!(result.affected_count, 0);
}

#[tokio::test]
async fn patient_may_cancel_instead_of_accepting_an_offer() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "pending_patient_decision",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "cancelled",
        )]))
        .expect(1)
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = CascadeService::new(&config);

    let patient = User {
        id: patient_id.to_string(),
        email: None,
        role: Some("patient".to_string()),
        created_at: None,
    };

    let cancelled = service
        .confirm_reschedule(appointment_id, &patient, RescheduleDecision::Cancel, "token")
        .await
        .expect("cancellation should succeed");

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn leave_requires_the_doctor_or_an_admin() {
    let config = TestConfig::with_base_url("http://127.0.0.1:1").to_app_config();
    let service = CascadeService::new(&config);

    let result = service
        .handle_unavailability(
            Uuid::new_v4(),
            &doctor_user(Uuid::new_v4()),
            leave_request(Uuid::new_v4()),
            "token",
        )
        .await;

    assert_matches!(result, Err(CascadeError::Unauthorized));
}

#[tokio::test]
async fn leave_rejects_a_malformed_interval() {
    let config = TestConfig::with_base_url("http://127.0.0.1:1").to_app_config();
    let service = CascadeService::new(&config);

    let doctor_id = Uuid::new_v4();
    let mut request = leave_request(Uuid::new_v4());
    request.end_ts = request.start_ts;

    let result = service
        .handle_unavailability(doctor_id, &doctor_user(doctor_id), request, "token")
        .await;

    assert_matches!(result, Err(CascadeError::InvalidInterval(_)));
}
