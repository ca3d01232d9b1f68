//! API token authentication and the per-token hourly quota.

mod common;

use std::collections::HashMap;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Duration;
use common::{seed_api_token, spawn_app, ClockExt};
use shield_service::models::actions;

#[tokio::test]
async fn api_token_authenticates_and_counts_usage() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 1000, HashMap::new());

    let (status, body) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "service");
    assert_eq!(body["org_id"], app.org_id.to_string());

    let tokens = app.stores.api_tokens.lock().unwrap();
    let row = tokens.get(&token_id).unwrap();
    assert_eq!(row.requests_this_hour, 1);
    assert!(row.last_used_at.is_some());
}

#[tokio::test]
async fn quota_allows_n_then_rejects_n_plus_one() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 3, HashMap::new());

    for i in 1..=3 {
        let (status, _) = app.get_auth("/auth/me", &raw).await;
        assert_eq!(status, StatusCode::OK, "request {} should be admitted", i);
    }

    let (status, body) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");

    // The denied request still advanced the counter but not last_used_at.
    let row = {
        let tokens = app.stores.api_tokens.lock().unwrap();
        tokens.get(&token_id).unwrap().clone()
    };
    assert_eq!(row.requests_this_hour, 4);
}

#[tokio::test]
async fn window_reset_after_one_hour_admits_again() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 2, HashMap::new());

    assert_eq!(app.get_auth("/auth/me", &raw).await.0, StatusCode::OK);
    assert_eq!(app.get_auth("/auth/me", &raw).await.0, StatusCode::OK);
    assert_eq!(
        app.get_auth("/auth/me", &raw).await.0,
        StatusCode::TOO_MANY_REQUESTS
    );

    // A full hour later the window resets regardless of the prior count.
    app.clock.advance(Duration::hours(1));

    let (status, _) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::OK);

    let tokens = app.stores.api_tokens.lock().unwrap();
    let row = tokens.get(&token_id).unwrap();
    assert_eq!(row.requests_this_hour, 1);
    assert_eq!(row.hour_window_start, app.clock.now_utc());
}

#[tokio::test]
async fn boundary_at_999_of_1000_then_429() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 1000, HashMap::new());

    // Window opened 5 minutes ago with 999 requests already counted.
    {
        let mut tokens = app.stores.api_tokens.lock().unwrap();
        let row = tokens.get_mut(&token_id).unwrap();
        row.requests_this_hour = 999;
        row.hour_window_start = app.clock.now_utc() - Duration::minutes(5);
    }

    let (status, _) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::OK);
    {
        let tokens = app.stores.api_tokens.lock().unwrap();
        assert_eq!(tokens.get(&token_id).unwrap().requests_this_hour, 1000);
    }

    let (status, body) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "TOO_MANY_REQUESTS");
}

#[tokio::test]
async fn malformed_token_shapes_are_unauthorized() {
    let app = spawn_app().await;

    // Right prefix, too short.
    let (status, _) = app.get_auth("/auth/me", "ktv_live_short").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // No prefix at all.
    let (status, _) = app
        .get_auth("/auth/me", &"x".repeat(64))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let app = spawn_app().await;

    let raw = format!("ktv_live_{}", "f".repeat(64));
    let (status, _) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn revoked_token_is_unauthorized_but_attributed() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 1000, HashMap::new());

    {
        let mut tokens = app.stores.api_tokens.lock().unwrap();
        tokens.get_mut(&token_id).unwrap().revoked_at = Some(app.clock.now_utc());
    }

    let (status, _) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    common::drain_background_tasks().await;

    // The denied attempt is still attributed to the revoked token.
    let token_id_str = token_id.to_string();
    let activity = app.stores.activity.lock().unwrap();
    assert!(activity.iter().any(|e| {
        e.action == actions::API_TOKEN_USED
            && e.entity_id.as_deref() == Some(token_id_str.as_str())
            && e.after.as_ref().map_or(false, |a| a["success"] == false)
    }));
}

#[tokio::test]
async fn successful_request_records_usage_audit() {
    let app = spawn_app().await;
    let (raw, token_id) = seed_api_token(&app, 1000, HashMap::new());

    let (status, _) = app.get_auth("/auth/me", &raw).await;
    assert_eq!(status, StatusCode::OK);

    common::drain_background_tasks().await;

    let activity = app.stores.activity.lock().unwrap();
    let entry = activity
        .iter()
        .find(|e| e.action == actions::API_TOKEN_USED)
        .expect("usage entry missing");
    let token_id_str = token_id.to_string();
    assert_eq!(entry.entity_id.as_deref(), Some(token_id_str.as_str()));
    let after = entry.after.as_ref().unwrap();
    assert_eq!(after["method"], "GET");
    assert_eq!(after["endpoint"], "/auth/me");
    assert_eq!(after["status_code"], 200);
    assert_eq!(after["success"], true);
}

#[tokio::test]
async fn missing_credential_is_unauthorized() {
    let app = spawn_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}
