//! API token rows - long-lived hashed credentials for service accounts.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Bearer prefix identifying Kentiva API tokens.
pub const API_TOKEN_PREFIX: &str = "ktv_live_";

/// Minimum total credential length accepted before any hashing or lookup
/// work is spent on it.
pub const API_TOKEN_MIN_LEN: usize = 40;

/// API token entity. Identifies a service account bound to one org and one
/// role, with a capability map and a persisted hourly request counter.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ApiToken {
    pub token_id: Uuid,
    pub org_id: Uuid,
    pub name: String,
    pub role: String,
    /// SHA-256 hex digest of the raw credential.
    #[serde(skip_serializing)]
    pub token_hash: String,
    /// Capability name -> grant. A missing capability is not granted.
    pub scopes: Json<HashMap<String, bool>>,
    pub rate_limit_per_hour: i64,
    /// Requests counted since `hour_window_start`.
    pub requests_this_hour: i64,
    pub hour_window_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiToken {
    pub fn new(
        org_id: Uuid,
        name: String,
        role: String,
        token_hash: String,
        scopes: HashMap<String, bool>,
        rate_limit_per_hour: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            org_id,
            name,
            role,
            token_hash,
            scopes: Json(scopes),
            rate_limit_per_hour,
            requests_this_hour: 0,
            hour_window_start: now,
            created_at: now,
            revoked_at: None,
            last_used_at: None,
        }
    }

    /// Cheap shape check applied before any hashing work.
    pub fn matches_shape(raw: &str) -> bool {
        raw.starts_with(API_TOKEN_PREFIX) && raw.len() >= API_TOKEN_MIN_LEN
    }

    /// The hourly accounting window is expired once a full hour has passed
    /// since it was opened.
    pub fn window_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.hour_window_start >= Duration::hours(1)
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}
