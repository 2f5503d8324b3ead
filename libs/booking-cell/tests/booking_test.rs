// libs/booking-cell/tests/booking_test.rs
use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::models::{
    AppointmentStatus, BookingError, ConfirmBookingRequest, DirectBookingRequest, VisitType,
};
use booking_cell::services::booking::BookingService;
use shared_models::auth::User;
use shared_utils::test_utils::TestConfig;

fn live_hold_row(hold_id: Uuid, doctor_id: Uuid, clinic_id: Uuid, patient_id: Uuid) -> serde_json::Value {
    json!({
        "id": hold_id,
        "doctor_id": doctor_id,
        "clinic_id": clinic_id,
        "patient_id": patient_id,
        "start_ts": "2026-09-07T09:00:00Z",
        "end_ts": "2026-09-07T09:30:00Z",
        "status": "active",
        "ttl_expires_at": (Utc::now() + Duration::seconds(90)).to_rfc3339(),
        "created_at": Utc::now().to_rfc3339()
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
        "start_ts": "2026-09-07T09:00:00Z",
        "end_ts": "2026-09-07T09:30:00Z",
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

fn lock_row() -> serde_json::Value {
    json!({
        "id": Uuid::new_v4(),
        "lock_key": "slot:test",
        "expires_at": (Utc::now() + Duration::seconds(30)).to_rfc3339()
    })
}

fn patient(patient_id: Uuid) -> User {
    User {
        id: patient_id.to_string(),
        email: None,
        role: Some("patient".to_string()),
        created_at: None,
    }
}

async fn mount_lock_lifecycle(server: &MockServer) {
    // Covers both the expired-lock sweep and the final release.
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![lock_row()]))
        .mount(server)
        .await;
}

#[tokio::test]
async fn confirm_from_hold_books_the_slot() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![live_hold_row(hold_id, doctor_id, clinic_id, patient_id)]),
        )
        .mount(&server)
        .await;

    mount_lock_lifecycle(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![appointment_row(
            appointment_id,
            patient_id,
            doctor_id,
            clinic_id,
            "confirmed",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let appointment = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await
        .expect("confirmation should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
}

#[tokio::test]
async fn confirm_carries_address_and_fee_into_the_appointment() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![live_hold_row(hold_id, doctor_id, clinic_id, patient_id)]),
        )
        .mount(&server)
        .await;

    mount_lock_lifecycle(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    // The insert must carry the visit location and fee from the request.
    let mut row = appointment_row(Uuid::new_v4(), patient_id, doctor_id, clinic_id, "confirmed");
    row["address"] = json!("12 Rue de la Paix, Paris");
    row["fee"] = json!(60.0);

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({
            "address": "12 Rue de la Paix, Paris",
            "fee": 60.0
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![row]))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let appointment = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: Some("12 Rue de la Paix, Paris".to_string()),
                fee: Some(60.0),
            },
            "token",
        )
        .await
        .expect("confirmation should succeed");

    assert_eq!(appointment.address.as_deref(), Some("12 Rue de la Paix, Paris"));
    assert_eq!(appointment.fee, Some(60.0));
}

#[tokio::test]
async fn confirm_refuses_a_missing_hold() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            Uuid::new_v4(),
            ConfirmBookingRequest {
                hold_id: Uuid::new_v4(),
                visit_type: VisitType::FirstVisit,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::HoldNotFound));
}

#[tokio::test]
async fn confirm_refuses_an_expired_hold() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    let mut row = live_hold_row(hold_id, Uuid::new_v4(), Uuid::new_v4(), patient_id);
    row["ttl_expires_at"] = json!((Utc::now() - Duration::seconds(5)).to_rfc3339());

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![row]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::HoldExpired));
}

#[tokio::test]
async fn confirm_refuses_another_patients_hold() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![live_hold_row(
            hold_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            Uuid::new_v4(),
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::HoldOwnershipMismatch));
}

#[tokio::test]
async fn contended_slot_lock_means_another_booking_won() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![live_hold_row(
            hold_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            patient_id,
        )]))
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    // Unique violation on the lock key: a concurrent confirm holds the slot.
    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::SlotBookedByAnother));
}

#[tokio::test]
async fn recheck_under_lock_catches_a_booked_slot() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![live_hold_row(hold_id, doctor_id, clinic_id, patient_id)]),
        )
        .mount(&server)
        .await;

    mount_lock_lifecycle(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(vec![json!({ "id": Uuid::new_v4() })]),
        )
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::SlotBookedByAnother));
}

#[tokio::test]
async fn unique_index_violation_translates_to_slot_booked_by_another() {
    let server = MockServer::start().await;
    let hold_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_holds"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(vec![live_hold_row(hold_id, doctor_id, clinic_id, patient_id)]),
        )
        .mount(&server)
        .await;

    mount_lock_lifecycle(&server).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    // The lock was lost (expired mid-flight); the partial unique index is
    // the backstop and reports the same conflict.
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .confirm_from_hold(
            patient_id,
            ConfirmBookingRequest {
                hold_id,
                visit_type: VisitType::FollowUp,
                address: None,
                fee: None,
            },
            "token",
        )
        .await;

    assert_matches!(result, Err(BookingError::SlotBookedByAnother));
}

#[tokio::test]
async fn direct_booking_requires_the_doctor_or_an_admin() {
    let config = TestConfig::with_base_url("http://127.0.0.1:1").to_app_config();
    let service = BookingService::new(&config);

    let doctor_id = Uuid::new_v4();
    let request = DirectBookingRequest {
        patient_id: Uuid::new_v4(),
        doctor_id,
        clinic_id: Uuid::new_v4(),
        visit_type: VisitType::Procedure,
        start_ts: Utc::now() + Duration::days(1),
        end_ts: Utc::now() + Duration::days(1) + Duration::minutes(30),
        address: None,
        fee: None,
    };

    let result = service
        .create_direct_appointment(&patient(Uuid::new_v4()), request, "token")
        .await;

    assert_matches!(result, Err(BookingError::Unauthorized));
}

#[tokio::test]
async fn start_consultation_rejects_a_completed_appointment() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();
    let doctor_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            Uuid::new_v4(),
            doctor_id,
            Uuid::new_v4(),
            "completed",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let doctor = User {
        id: doctor_id.to_string(),
        email: None,
        role: Some("doctor".to_string()),
        created_at: None,
    };

    let result = service
        .start_consultation(appointment_id, &doctor, "token")
        .await;

    assert_matches!(result, Err(BookingError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn cancellation_is_limited_to_the_appointment_parties() {
    let server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "confirmed",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = BookingService::new(&config);

    let result = service
        .cancel_appointment(appointment_id, &patient(Uuid::new_v4()), "token")
        .await;

    assert_matches!(result, Err(BookingError::Unauthorized));
}
