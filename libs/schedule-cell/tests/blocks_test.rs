// libs/schedule-cell/tests/blocks_test.rs
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use schedule_cell::models::{BlockType, CreateScheduleBlockRequest, ScheduleError};
use schedule_cell::services::blocks::ScheduleBlockService;
use shared_utils::test_utils::TestConfig;

fn block_row(
    id: Uuid,
    doctor_id: Uuid,
    clinic_id: Uuid,
    block_type: &str,
    start: &str,
    end: &str,
) -> serde_json::Value {
    json!({
        "id": id,
        "doctor_id": doctor_id,
        "clinic_id": clinic_id,
        "block_type": block_type,
        "start_ts": start,
        "end_ts": end,
        "slot_minutes": 30,
        "buffer_minutes": 5,
        "created_at": "2026-09-01T08:00:00Z",
        "updated_at": "2026-09-01T08:00:00Z"
    })
}

fn work_request(clinic_id: Uuid, start_h: u32, end_h: u32) -> CreateScheduleBlockRequest {
    CreateScheduleBlockRequest {
        clinic_id,
        block_type: BlockType::Work,
        start_ts: Utc.with_ymd_and_hms(2026, 9, 7, start_h, 0, 0).unwrap(),
        end_ts: Utc.with_ymd_and_hms(2026, 9, 7, end_h, 0, 0).unwrap(),
        slot_minutes: Some(30),
        buffer_minutes: Some(5),
    }
}

#[tokio::test]
async fn create_block_succeeds_when_no_conflicts() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let block_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<serde_json::Value>::new()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![block_row(
            block_id,
            doctor_id,
            clinic_id,
            "work",
            "2026-09-07T09:00:00Z",
            "2026-09-07T12:00:00Z",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = ScheduleBlockService::new(&config);

    let block = service
        .create_block(doctor_id, work_request(clinic_id, 9, 12), "token")
        .await
        .expect("block creation should succeed");

    assert_eq!(block.id, block_id);
    assert_eq!(block.block_type, BlockType::Work);
}

#[tokio::test]
async fn create_block_rejects_partial_overlap() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![block_row(
            Uuid::new_v4(),
            doctor_id,
            clinic_id,
            "work",
            "2026-09-07T09:00:00Z",
            "2026-09-07T12:00:00Z",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = ScheduleBlockService::new(&config);

    let result = service
        .create_block(doctor_id, work_request(clinic_id, 10, 13), "token")
        .await;

    assert_matches!(result, Err(ScheduleError::ScheduleOverlap));
}

#[tokio::test]
async fn create_block_rejects_exact_duplicate_with_distinct_error() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_blocks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![block_row(
            Uuid::new_v4(),
            doctor_id,
            clinic_id,
            "work",
            "2026-09-07T09:00:00Z",
            "2026-09-07T12:00:00Z",
        )]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = ScheduleBlockService::new(&config);

    let result = service
        .create_block(doctor_id, work_request(clinic_id, 9, 12), "token")
        .await;

    assert_matches!(result, Err(ScheduleError::DuplicateBlock));
}

#[tokio::test]
async fn create_block_rejects_malformed_interval_before_any_persistence() {
    // No mocks mounted: a malformed interval must never reach the store.
    let config = TestConfig::with_base_url("http://127.0.0.1:1").to_app_config();
    let service = ScheduleBlockService::new(&config);

    let mut request = work_request(Uuid::new_v4(), 12, 12);
    request.end_ts = request.start_ts;

    let result = service.create_block(Uuid::new_v4(), request, "token").await;

    assert_matches!(result, Err(ScheduleError::InvalidInterval(_)));
}

#[tokio::test]
async fn create_work_block_requires_slot_minutes() {
    let config = TestConfig::with_base_url("http://127.0.0.1:1").to_app_config();
    let service = ScheduleBlockService::new(&config);

    let mut request = work_request(Uuid::new_v4(), 9, 12);
    request.slot_minutes = None;

    let result = service.create_block(Uuid::new_v4(), request, "token").await;

    assert_matches!(result, Err(ScheduleError::ValidationError(_)));
}

#[tokio::test]
async fn delete_block_refuses_while_appointments_occupy_it() {
    let server = MockServer::start().await;
    let doctor_id = Uuid::new_v4();
    let clinic_id = Uuid::new_v4();
    let block_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_blocks"))
        .and(query_param("id", format!("eq.{}", block_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![block_row(
            block_id,
            doctor_id,
            clinic_id,
            "work",
            "2026-09-07T09:00:00Z",
            "2026-09-07T12:00:00Z",
        )]))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": Uuid::new_v4(),
            "patient_id": Uuid::new_v4(),
            "clinic_id": clinic_id,
            "start_ts": "2026-09-07T10:00:00Z",
            "end_ts": "2026-09-07T10:30:00Z",
            "status": "confirmed"
        })]))
        .mount(&server)
        .await;

    let config = TestConfig::with_base_url(&server.uri()).to_app_config();
    let service = ScheduleBlockService::new(&config);

    let result = service.delete_block(block_id, doctor_id, "token").await;

    assert_matches!(result, Err(ScheduleError::BlockInUse));
}
