//! Shared harness: the full router wired against in-memory stores and a
//! manual clock, so the suite runs hermetically.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use tower::util::ServiceExt;
use uuid::Uuid;

use service_core::middleware::rate_limit::create_ip_rate_limiter;
use shield_service::config::{
    DatabaseConfig, DetectorConfig, Environment, JwtConfig, RateLimitConfig, SecurityConfig,
    SessionConfig, ShieldConfig, SwaggerConfig, SwaggerMode,
};
use shield_service::models::{ApiToken, DirectoryUser, Membership, API_TOKEN_PREFIX};
use shield_service::services::token_crypto::sha256_hex;
use shield_service::services::{
    ApiTokenService, JwtService, ManualClock, SecurityEventService, SessionService, Shield,
};
use shield_service::stores::{InMemoryFailureBuckets, MemoryStores};
use shield_service::utils::{hash_password, Password};
use shield_service::{build_router, AppState};

pub const TEST_PASSWORD: &str = "correct horse battery staple";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub stores: Arc<MemoryStores>,
    pub clock: Arc<ManualClock>,
    pub jwt: JwtService,
    pub org_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
}

pub fn test_config() -> ShieldConfig {
    ShieldConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "shield-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused-in-tests".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        jwt: JwtConfig {
            signing_secret: "integration-test-signing-secret".to_string(),
            access_token_expiry_minutes: 15,
        },
        session: SessionConfig {
            refresh_token_expiry_days: 30,
            cookie_name: "ktv_session".to_string(),
        },
        detector: DetectorConfig {
            failed_login_threshold: 5,
            window_minutes: 10,
            bulk_deactivation_threshold: 3,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 10_000,
            login_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
    }
}

pub async fn spawn_app() -> TestApp {
    let config = test_config();
    let stores = Arc::new(MemoryStores::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let buckets = Arc::new(InMemoryFailureBuckets::new());

    let jwt = JwtService::new(&config.jwt).expect("Failed to create JWT service");

    let shield = Shield::new(
        buckets,
        stores.clone(),
        stores.clone(),
        clock.clone(),
        config.detector.clone(),
    );
    let sessions = SessionService::new(
        stores.clone(),
        stores.clone(),
        stores.clone(),
        jwt.clone(),
        shield.clone(),
        clock.clone(),
        config.session.refresh_token_expiry_days,
    );
    let api_tokens = ApiTokenService::new(stores.clone(), stores.clone(), clock.clone());
    let security_events = SecurityEventService::new(stores.clone(), clock.clone());

    let state = AppState {
        config: config.clone(),
        sessions,
        api_tokens,
        shield,
        security_events,
        activity: stores.clone(),
        health: stores.clone(),
        login_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        ),
        ip_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        ),
    };

    // One active user with an active membership, ready to log in.
    let org_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let email = "user@example.com".to_string();
    seed_user(&stores, org_id, user_id, &email, "admin");

    let app = build_router(state.clone())
        .await
        .expect("Failed to build router");

    TestApp {
        app,
        state,
        stores,
        clock,
        jwt,
        org_id,
        user_id,
        email,
    }
}

pub fn seed_user(stores: &MemoryStores, org_id: Uuid, user_id: Uuid, email: &str, role: &str) {
    let password_hash = hash_password(&Password::new(TEST_PASSWORD.to_string()))
        .expect("Failed to hash test password");

    stores.seed_user(
        DirectoryUser {
            user_id,
            email: email.to_string(),
            name: Some("Test User".to_string()),
            password_hash: password_hash.as_str().to_string(),
            state_code: "active".to_string(),
            created_at: Utc::now(),
        },
        Membership {
            org_id,
            user_id,
            role: role.to_string(),
            state_code: "ACTIVE".to_string(),
        },
    );
}

/// Seed an API token and return the raw credential.
pub fn seed_api_token(
    app: &TestApp,
    rate_limit_per_hour: i64,
    scopes: HashMap<String, bool>,
) -> (String, Uuid) {
    let raw = format!(
        "{}{}{}",
        API_TOKEN_PREFIX,
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    let token = ApiToken::new(
        app.org_id,
        "test-service".to_string(),
        "service".to_string(),
        sha256_hex(&raw),
        scopes,
        rate_limit_per_hour,
        app.clock.now_utc(),
    );
    let token_id = token.token_id;
    app.stores.seed_api_token(token);
    (raw, token_id)
}

impl TestApp {
    pub async fn login(&self) -> serde_json::Value {
        let response = self
            .post_json(
                "/auth/login",
                serde_json::json!({
                    "org_id": self.org_id,
                    "email": self.email,
                    "password": TEST_PASSWORD,
                }),
            )
            .await;
        assert_eq!(response.0, StatusCode::OK, "login failed: {}", response.1);
        response.1
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn post_json_auth(
        &self,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("Authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");
        let status = response.status();

        let bytes = http_body_util::BodyExt::collect(response.into_body())
            .await
            .expect("failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, body)
    }
}

/// The manual clock exposes `now` through the Clock trait; re-export a
/// convenience for test setup code.
pub trait ClockExt {
    fn now_utc(&self) -> chrono::DateTime<Utc>;
}

impl ClockExt for ManualClock {
    fn now_utc(&self) -> chrono::DateTime<Utc> {
        use shield_service::services::Clock;
        self.now()
    }
}

/// Let the spawned fire-and-forget writers drain before asserting on them.
pub async fn drain_background_tasks() {
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
}
