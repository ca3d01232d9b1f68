use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::SecurityEvent;
use crate::stores::SecurityEventFilter;

#[derive(Debug, Deserialize, IntoParams)]
pub struct SecurityEventQuery {
    pub org_id: Option<Uuid>,
    /// LOW | MEDIUM | HIGH | CRITICAL
    pub severity: Option<String>,
    pub resolved: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<SecurityEventQuery> for SecurityEventFilter {
    fn from(q: SecurityEventQuery) -> Self {
        let defaults = SecurityEventFilter::default();
        SecurityEventFilter {
            org_id: q.org_id,
            severity: q.severity.map(|s| s.to_uppercase()),
            resolved: q.resolved,
            limit: q.limit.unwrap_or(defaults.limit).clamp(1, 200),
            offset: q.offset.unwrap_or(0).max(0),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecurityEventResponse {
    pub event_id: Uuid,
    pub org_id: Uuid,
    #[schema(example = "FAILED_LOGIN_SPIKE")]
    pub event_type: String,
    #[schema(example = "MEDIUM")]
    pub severity: String,
    pub description: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<SecurityEvent> for SecurityEventResponse {
    fn from(e: SecurityEvent) -> Self {
        Self {
            event_id: e.event_id,
            org_id: e.org_id,
            event_type: e.event_type,
            severity: e.severity,
            description: e.description,
            entity_type: e.entity_type,
            entity_id: e.entity_id,
            user_id: e.user_id,
            meta: e.meta,
            created_at: e.created_at,
            resolved_at: e.resolved_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeactivationCheckRequest {
    pub org_id: Uuid,
    pub actor_user_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeactivationCheckResponse {
    /// True when a new BULK_USER_DEACTIVATION event was raised.
    pub detected: bool,
}
