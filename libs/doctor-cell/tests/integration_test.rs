// libs/doctor-cell/tests/integration_test.rs
// Availability against a mocked primary store.

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{AvailabilityError, CreateAvailabilityRequest};
use doctor_cell::services::AvailabilityService;
use shared_database::{FallbackStore, StoreSource};
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[tokio::test]
async fn test_primary_slots_are_returned_without_synthesis() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .and(query_param("doctor_id", "eq.doc-1"))
        .and(query_param("is_booked", "eq.false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::availability_response("slot-2", "doc-1", 4),
            MockSupabaseResponses::availability_response("slot-1", "doc-1", 2),
        ])))
        .mount(&server)
        .await;

    let state = TestConfig::with_primary(&server.uri()).to_state();
    let response = AvailabilityService::new(&state)
        .get_availability("doc-1", today())
        .await
        .unwrap();

    assert!(!response.synthesized);
    assert_eq!(response.source, Some(StoreSource::Primary));
    assert_eq!(response.slots.len(), 2);
    assert_eq!(response.slots[0].id, "slot-1");
}

#[tokio::test]
async fn test_primary_error_on_create_lands_in_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("relation does not exist", "42P01"),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctor_availability"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fallback = std::sync::Arc::new(FallbackStore::in_memory());
    let state = TestConfig::with_primary(&server.uri()).to_state_with(fallback.clone());
    let service = AvailabilityService::new(&state);

    let slot = service
        .create_availability("doc-1", CreateAvailabilityRequest {
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            specific_date: Some(today()),
        })
        .await
        .unwrap();

    assert_eq!(fallback.count::<doctor_cell::AvailabilitySlot>().await, 1);

    // Primary answers with nothing, so the fallback slot is served.
    let response = service.get_availability("doc-1", today()).await.unwrap();
    assert!(!response.synthesized);
    assert_eq!(response.source, Some(StoreSource::Fallback));
    assert_eq!(response.slots[0].id, slot.id);
}

#[tokio::test]
async fn test_invalid_day_of_week_writes_nothing() {
    let fallback = std::sync::Arc::new(FallbackStore::in_memory());
    let state = TestConfig::primary_down().to_state_with(fallback.clone());

    let result = AvailabilityService::new(&state)
        .create_availability("doc-1", CreateAvailabilityRequest {
            day_of_week: 7,
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            specific_date: None,
        })
        .await;

    assert_matches!(result, Err(AvailabilityError::ValidationError(_)));
    assert_eq!(fallback.count::<doctor_cell::AvailabilitySlot>().await, 0);
}
