//! The operator review surface: listing and resolving security events.

mod common;

use std::collections::HashMap;

use axum::http::StatusCode;
use chrono::Duration;
use common::{seed_api_token, spawn_app, ClockExt};
use shield_service::models::{SecurityEvent, SecurityEventType, Severity};
use uuid::Uuid;

fn seed_event(
    app: &common::TestApp,
    event_type: SecurityEventType,
    severity: Severity,
) -> Uuid {
    let event = SecurityEvent::new(
        app.org_id,
        event_type,
        severity,
        "seeded event",
        app.clock.now_utc(),
    );
    let event_id = event.event_id;
    app.stores.security_events.lock().unwrap().push(event);
    event_id
}

#[tokio::test]
async fn listing_filters_by_severity_and_resolution() {
    let app = spawn_app().await;
    seed_event(&app, SecurityEventType::FailedLoginSpike, Severity::Medium);
    seed_event(&app, SecurityEventType::BulkUserDeactivation, Severity::High);

    let login_body = app.login().await;
    let token = login_body["access_token"].as_str().unwrap().to_string();

    let (status, body) = app.get_auth("/security/events", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = app
        .get_auth("/security/events?severity=HIGH", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["event_type"], "BULK_USER_DEACTIVATION");

    let (status, body) = app
        .get_auth("/security/events?resolved=true", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn listing_paginates() {
    let app = spawn_app().await;
    for _ in 0..5 {
        seed_event(&app, SecurityEventType::FailedLoginSpike, Severity::Medium);
    }

    let login_body = app.login().await;
    let token = login_body["access_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .get_auth("/security/events?limit=2&offset=0", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = app
        .get_auth("/security/events?limit=2&offset=4", &token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn resolving_is_idempotent() {
    let app = spawn_app().await;
    let event_id = seed_event(&app, SecurityEventType::FailedLoginSpike, Severity::Medium);

    let login_body = app.login().await;
    let token = login_body["access_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json_auth(
            &format!("/security/events/{}/resolve", event_id),
            &token,
            serde_json::json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let first_resolved_at = body["resolved_at"].as_str().unwrap().to_string();

    // Resolving later changes nothing: the first resolution wins.
    app.clock.advance(Duration::minutes(30));
    let (status, body) = app
        .post_json_auth(
            &format!("/security/events/{}/resolve", event_id),
            &token,
            serde_json::json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resolved_at"].as_str().unwrap(), first_resolved_at);
}

#[tokio::test]
async fn resolving_unknown_event_is_not_found() {
    let app = spawn_app().await;
    let login_body = app.login().await;
    let token = login_body["access_token"].as_str().unwrap().to_string();

    let (status, body) = app
        .post_json_auth(
            &format!("/security/events/{}/resolve", Uuid::new_v4()),
            &token,
            serde_json::json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn service_tokens_need_the_matching_capability() {
    let app = spawn_app().await;
    seed_event(&app, SecurityEventType::FailedLoginSpike, Severity::Medium);

    // No scopes at all: reads are forbidden.
    let (raw_unscoped, _) = seed_api_token(&app, 1000, HashMap::new());
    let (status, body) = app.get_auth("/security/events", &raw_unscoped).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    // security:read grants the listing but not resolution.
    let (raw_reader, _) = seed_api_token(
        &app,
        1000,
        HashMap::from([("security:read".to_string(), true)]),
    );
    let (status, _) = app.get_auth("/security/events", &raw_reader).await;
    assert_eq!(status, StatusCode::OK);

    let event_id = seed_event(&app, SecurityEventType::FailedLoginSpike, Severity::Low);
    let (status, _) = app
        .post_json_auth(
            &format!("/security/events/{}/resolve", event_id),
            &raw_reader,
            serde_json::json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // A wildcard grant covers both.
    let (raw_admin, _) = seed_api_token(&app, 1000, HashMap::from([("*".to_string(), true)]));
    let (status, _) = app
        .post_json_auth(
            &format!("/security/events/{}/resolve", event_id),
            &raw_admin,
            serde_json::json!({}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
