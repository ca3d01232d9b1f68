//! Security event rows - durable anomaly records for operator review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Anomaly kinds raised by the threat detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventType {
    /// Burst of failed logins for one (org, email) pair.
    FailedLoginSpike,
    /// Burst of account deactivations by a single actor.
    BulkUserDeactivation,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::FailedLoginSpike => "FAILED_LOGIN_SPIKE",
            SecurityEventType::BulkUserDeactivation => "BULK_USER_DEACTIVATION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Security event entity. Created once per detected burst per window, never
/// deleted; `resolved_at` is set once by an operator action.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SecurityEvent {
    pub event_id: Uuid,
    pub org_id: Uuid,
    pub event_type: String,
    pub severity: String,
    pub description: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SecurityEvent {
    pub fn new(
        org_id: Uuid,
        event_type: SecurityEventType,
        severity: Severity,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            org_id,
            event_type: event_type.as_str().to_string(),
            severity: severity.as_str().to_string(),
            description: description.into(),
            entity_type: None,
            entity_id: None,
            user_id: None,
            meta: serde_json::Value::Null,
            created_at: now,
            resolved_at: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = meta;
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_and_severity_codes() {
        assert_eq!(
            SecurityEventType::FailedLoginSpike.as_str(),
            "FAILED_LOGIN_SPIKE"
        );
        assert_eq!(
            SecurityEventType::BulkUserDeactivation.as_str(),
            "BULK_USER_DEACTIVATION"
        );
        assert_eq!(Severity::Medium.as_str(), "MEDIUM");
        assert_eq!(Severity::High.as_str(), "HIGH");
    }

    #[test]
    fn new_event_is_unresolved() {
        let event = SecurityEvent::new(
            Uuid::new_v4(),
            SecurityEventType::FailedLoginSpike,
            Severity::Medium,
            "5 failed login attempts",
            Utc::now(),
        );

        assert!(!event.is_resolved());
        assert_eq!(event.severity, "MEDIUM");
    }
}
