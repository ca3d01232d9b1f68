//! Activity log entries - the audit collaborator's shape.
//!
//! The shield core only appends to and counts over this log; the log itself
//! is owned by the platform.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Actions written or queried by this core.
pub mod actions {
    pub const LOGIN_SUCCESS: &str = "LOGIN_SUCCESS";
    pub const TOKEN_REFRESH: &str = "TOKEN_REFRESH";
    pub const LOGOUT: &str = "LOGOUT";
    pub const API_TOKEN_USED: &str = "API_TOKEN_USED";
    pub const USER_DEACTIVATE: &str = "USER_DEACTIVATE";
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ActivityEntry {
    pub entry_id: Uuid,
    pub org_id: Uuid,
    pub actor_user_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(org_id: Uuid, action: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4(),
            org_id,
            actor_user_id: None,
            entity_type: entity_type.into(),
            entity_id: None,
            action: action.into(),
            before: None,
            after: None,
            ip_address: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_actor(mut self, actor_user_id: Uuid) -> Self {
        self.actor_user_id = Some(actor_user_id);
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_after(mut self, after: serde_json::Value) -> Self {
        self.after = Some(after);
        self
    }

    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }
}
