use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, LogoutRequest, RefreshRequest},
    dtos::ErrorResponse,
    middleware::{AnyAuth, AuthUser},
    models::RequestIdentity,
    services::TokenResponse,
    utils::ValidatedJson,
    AppState,
};

/// Login with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 403, description = "Account or membership not active", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 429, description = "Too many login attempts", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string());

    let tokens = state
        .sessions
        .login(req.org_id, &req.email, &req.password, ip_address)
        .await?;

    Ok((StatusCode::OK, Json(tokens)))
}

/// Rotate a refresh token into a new token pair
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Missing, revoked, or expired refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let tokens = state.sessions.refresh(&req.refresh_token).await?;
    Ok((StatusCode::OK, Json(tokens)))
}

/// Logout: revoke the presented refresh token
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out"),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Option<Json<LogoutRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let refresh_token = body.and_then(|Json(req)| req.refresh_token);
    state.sessions.logout(refresh_token.as_deref()).await;
    tracing::debug!(user_id = %user.user_id, "Logout request handled");

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "message": "Logged out successfully" })),
    ))
}

/// Resolved identity of the presented credential
#[utoipa::path(
    get,
    path = "/auth/me",
    responses(
        (status = 200, description = "Authenticated identity", body = RequestIdentity),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn me(AnyAuth(identity): AnyAuth) -> impl IntoResponse {
    Json(identity)
}
