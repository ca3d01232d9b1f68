pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

use std::sync::Arc;

use service_core::axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ShieldConfig;
use crate::services::{
    ApiTokenService, SecurityEventService, SessionService, Shield,
};
use crate::stores::{ActivityLog, StoreHealth};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::security::list_events,
        handlers::security::resolve_event,
        handlers::security::check_bulk_deactivation,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::security::SecurityEventResponse,
            dtos::security::BulkDeactivationCheckRequest,
            dtos::security::BulkDeactivationCheckResponse,
            services::TokenResponse,
            models::Identity,
            models::ServiceIdentity,
            models::RequestIdentity,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Session and token lifecycle"),
        (name = "Security", description = "Security event review and detection"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT or ktv_live_ API token")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: ShieldConfig,
    pub sessions: SessionService,
    pub api_tokens: ApiTokenService,
    pub shield: Shield,
    pub security_events: SecurityEventService,
    pub activity: Arc<dyn ActivityLog>,
    pub health: Arc<dyn StoreHealth>,
    pub login_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login carries its own tighter IP limit on top of the global one.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Operator review surface; service-account callers additionally need the
    // matching capability.
    let security_read_routes = Router::new()
        .route("/security/events", get(handlers::security::list_events))
        .route_layer(from_fn(|req, next| {
            middleware::require_scope("security:read", req, next)
        }));
    let security_write_routes = Router::new()
        .route(
            "/security/events/:event_id/resolve",
            post(handlers::security::resolve_event),
        )
        .route(
            "/security/checks/bulk-deactivation",
            post(handlers::security::check_bulk_deactivation),
        )
        .route_layer(from_fn(|req, next| {
            middleware::require_scope("security:write", req, next)
        }));

    let guarded_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .merge(security_read_routes)
        .merge(security_write_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::credential_guard,
        ));

    let ip_limiter = state.ip_rate_limiter.clone();

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/auth/refresh", post(handlers::auth::refresh))
        .merge(login_route)
        .merge(guarded_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Add tracing layer
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &service_core::axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|origin| {
                            origin
                                .parse::<service_core::axum::http::HeaderValue>()
                                .map_err(|e| {
                                    tracing::error!("Invalid CORS origin '{}': {}", origin, e);
                                    e
                                })
                                .ok()
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                    service_core::axum::http::header::COOKIE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A dependency is down")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.health.ping().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::InternalError(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "database": "up"
        }
    })))
}
