//! Credential guard behavior: extraction, classification, dispatch.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::spawn_app;

#[tokio::test]
async fn bearer_session_token_authenticates() {
    let app = spawn_app().await;
    let login_body = app.login().await;
    let access_token = login_body["access_token"].as_str().unwrap().to_string();

    let (status, body) = app.get_auth("/auth/me", &access_token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "user");
    assert_eq!(body["user_id"], app.user_id.to_string());
    assert_eq!(body["org_id"], app.org_id.to_string());
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn session_cookie_is_a_fallback_for_the_header() {
    let app = spawn_app().await;
    let login_body = app.login().await;
    let access_token = login_body["access_token"].as_str().unwrap().to_string();

    let request = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("Cookie", format!("ktv_session={}", access_token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["kind"], "user");
}

#[tokio::test]
async fn header_wins_over_cookie() {
    let app = spawn_app().await;
    let login_body = app.login().await;
    let access_token = login_body["access_token"].as_str().unwrap().to_string();

    // Valid header, garbage cookie: the header must be the one consulted.
    let request = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("Authorization", format!("Bearer {}", access_token))
        .header("Cookie", "ktv_session=garbage")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn empty_bearer_value_is_unauthorized() {
    let app = spawn_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("Authorization", "Bearer ")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn non_bearer_authorization_is_unauthorized() {
    let app = spawn_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/auth/me")
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .body(Body::empty())
        .unwrap();
    let (status, _) = app.send(request).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unrecognized_credential_shape_is_unauthorized() {
    let app = spawn_app().await;

    let (status, _) = app.get_auth("/auth/me", "not-a-jwt-and-not-an-api-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_session_token_is_unauthorized() {
    let app = spawn_app().await;

    // Sign a token that expired an hour ago with the same secret.
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    let now = Utc::now();
    let claims = serde_json::json!({
        "sub": app.user_id.to_string(),
        "email": app.email,
        "role": "admin",
        "activeOrgId": app.org_id.to_string(),
        "exp": (now - Duration::hours(1)).timestamp(),
        "iat": (now - Duration::hours(2)).timestamp(),
        "jti": uuid::Uuid::new_v4().to_string(),
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret("integration-test-signing-secret".as_bytes()),
    )
    .unwrap();

    let (status, _) = app.get_auth("/auth/me", &token).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_needs_no_credentials() {
    let app = spawn_app().await;

    let request = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = app.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
