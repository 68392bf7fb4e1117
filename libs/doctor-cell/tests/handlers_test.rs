// libs/doctor-cell/tests/handlers_test.rs

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

use doctor_cell::router::availability_routes;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_slot_request(doctor_id: &str, bearer: Option<String>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/{}", doctor_id))
        .header("Content-Type", "application/json");

    if let Some(bearer) = bearer {
        builder = builder.header("Authorization", bearer);
    }

    builder.body(Body::from(body.to_string())).unwrap()
}

fn slot_body() -> Value {
    json!({
        "day_of_week": 3,
        "start_time": "09:00:00",
        "end_time": "10:00:00",
        "specific_date": null
    })
}

#[tokio::test]
async fn test_get_availability_is_public_and_synthesized() {
    let config = TestConfig::primary_down();
    let app = availability_routes(config.to_state());

    let response = app
        .oneshot(Request::builder().uri("/doc-1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["synthesized"], true);
    assert_eq!(body["total_slots"], 38);
    assert!(body["slots"][0]["id"].as_str().unwrap().starts_with("default-"));
}

#[tokio::test]
async fn test_create_availability_requires_auth() {
    let config = TestConfig::primary_down();
    let app = availability_routes(config.to_state());

    let response = app
        .oneshot(create_slot_request("doc-1", None, slot_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_doctor_creates_own_slot_then_reads_it() {
    let config = TestConfig::primary_down();
    let state = config.to_state();
    let doctor = TestUser::with_id("doc-1", "doctor");

    let response = availability_routes(state.clone())
        .oneshot(create_slot_request("doc-1", Some(JwtTestUtils::bearer(&doctor, &config)), slot_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["success"], true);
    assert_eq!(created["slot"]["doctor_id"], "doc-1");
    assert_eq!(created["slot"]["is_booked"], false);

    let response = availability_routes(state)
        .oneshot(Request::builder().uri("/doc-1").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let body = body_json(response).await;
    assert_eq!(body["synthesized"], false);
    assert_eq!(body["total_slots"], 1);
    assert_eq!(body["source"], "fallback");
}

#[tokio::test]
async fn test_doctor_cannot_create_slot_for_another_doctor() {
    let config = TestConfig::primary_down();
    let doctor = TestUser::with_id("doc-1", "doctor");

    let response = availability_routes(config.to_state())
        .oneshot(create_slot_request("doc-2", Some(JwtTestUtils::bearer(&doctor, &config)), slot_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_may_create_slot_for_any_doctor() {
    let config = TestConfig::primary_down();
    let admin = TestUser::admin("admin@example.com");

    let response = availability_routes(config.to_state())
        .oneshot(create_slot_request("doc-2", Some(JwtTestUtils::bearer(&admin, &config)), slot_body()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_time_range_is_bad_request() {
    let config = TestConfig::primary_down();
    let doctor = TestUser::with_id("doc-1", "doctor");
    let body = json!({
        "day_of_week": 3,
        "start_time": "11:00:00",
        "end_time": "10:00:00"
    });

    let response = availability_routes(config.to_state())
        .oneshot(create_slot_request("doc-1", Some(JwtTestUtils::bearer(&doctor, &config)), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("Start time must be before end time"));
}
