use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::security::{
        BulkDeactivationCheckRequest, BulkDeactivationCheckResponse, SecurityEventQuery,
        SecurityEventResponse,
    },
    dtos::ErrorResponse,
    stores::SecurityEventFilter,
    AppState,
};

/// List security events for operator review
#[utoipa::path(
    get,
    path = "/security/events",
    params(SecurityEventQuery),
    responses(
        (status = 200, description = "Matching security events", body = [SecurityEventResponse]),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Security",
    security(("bearer_auth" = []))
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<SecurityEventQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter: SecurityEventFilter = query.into();
    let events = state.security_events.list(&filter).await?;

    let body: Vec<SecurityEventResponse> =
        events.into_iter().map(SecurityEventResponse::from).collect();
    Ok(Json(body))
}

/// Resolve a security event (idempotent)
#[utoipa::path(
    post,
    path = "/security/events/{event_id}/resolve",
    params(("event_id" = Uuid, Path, description = "Security event id")),
    responses(
        (status = 200, description = "Event resolved (or already resolved)", body = SecurityEventResponse),
        (status = 404, description = "Unknown event id", body = ErrorResponse)
    ),
    tag = "Security",
    security(("bearer_auth" = []))
)]
pub async fn resolve_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let event = state.security_events.resolve(event_id).await?;
    Ok((StatusCode::OK, Json(SecurityEventResponse::from(event))))
}

/// Run the bulk-deactivation detector for one actor
///
/// Called by the user-management module after it records USER_DEACTIVATE
/// audit entries.
#[utoipa::path(
    post,
    path = "/security/checks/bulk-deactivation",
    request_body = BulkDeactivationCheckRequest,
    responses(
        (status = 200, description = "Detector verdict", body = BulkDeactivationCheckResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Security",
    security(("bearer_auth" = []))
)]
pub async fn check_bulk_deactivation(
    State(state): State<AppState>,
    Json(req): Json<BulkDeactivationCheckRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detected = state
        .shield
        .detect_bulk_deactivation(req.org_id, req.actor_user_id)
        .await?;

    Ok(Json(BulkDeactivationCheckResponse { detected }))
}
