//! Threat detector: failed-login bursts and bulk-deactivation bursts.

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::DetectorConfig;
use crate::models::{actions, SecurityEvent, SecurityEventType, Severity};
use crate::services::{Clock, ServiceError};
use crate::stores::{ActivityLog, FailureBucketStore, SecurityEventStore};

#[derive(Clone)]
pub struct Shield {
    buckets: Arc<dyn FailureBucketStore>,
    events: Arc<dyn SecurityEventStore>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    config: DetectorConfig,
}

impl Shield {
    pub fn new(
        buckets: Arc<dyn FailureBucketStore>,
        events: Arc<dyn SecurityEventStore>,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            buckets,
            events,
            activity,
            clock,
            config,
        }
    }

    fn bucket_key(org_id: Uuid, email: &str) -> String {
        format!("{}:{}", org_id, email.trim().to_lowercase())
    }

    /// Record one failed login for `(org, email)`.
    ///
    /// Raises a MEDIUM `FAILED_LOGIN_SPIKE` event when the trailing window
    /// reaches the threshold, at most once per window per key. The event
    /// write can never fail the login path: errors are logged and swallowed.
    pub async fn register_failed_attempt(&self, org_id: Uuid, user_id: Option<Uuid>, email: &str) {
        let now = self.clock.now();
        let window_start = now - Duration::minutes(self.config.window_minutes);
        let key = Self::bucket_key(org_id, email);

        let snapshot = self.buckets.record_failure(&key, now, window_start);

        if snapshot.attempts_in_window < self.config.failed_login_threshold {
            return;
        }

        // Already raised for this window; bounds event volume regardless of
        // how many more attempts arrive.
        if let Some(last) = snapshot.last_event_at {
            if last >= window_start {
                return;
            }
        }

        let normalized_email = email.trim().to_lowercase();
        let event = SecurityEvent::new(
            org_id,
            SecurityEventType::FailedLoginSpike,
            Severity::Medium,
            format!(
                "{} failed login attempts for {} within {} minutes",
                snapshot.attempts_in_window, normalized_email, self.config.window_minutes
            ),
            now,
        )
        .with_user(user_id)
        .with_meta(serde_json::json!({
            "email": normalized_email,
            "attempts": snapshot.attempts_in_window,
            "window_minutes": self.config.window_minutes,
        }));

        match self.events.insert(&event).await {
            Ok(()) => {
                self.buckets.note_event(&key, now);
                tracing::warn!(
                    org_id = %org_id,
                    email = %normalized_email,
                    attempts = snapshot.attempts_in_window,
                    "FAILED_LOGIN_SPIKE security event raised"
                );
            }
            Err(e) => {
                // Not noting the event leaves the next attempt free to retry.
                tracing::error!(error = %e, "Failed to persist FAILED_LOGIN_SPIKE event");
            }
        }
    }

    /// Drop the failure bucket for `(org, email)`. Called on every
    /// successful login so a later burst counts from zero.
    pub fn clear_failed_attempts(&self, org_id: Uuid, email: &str) {
        self.buckets.clear(&Self::bucket_key(org_id, email));
    }

    /// Count recent `USER_DEACTIVATE` audit entries by `actor_user_id`;
    /// raise one HIGH `BULK_USER_DEACTIVATION` event per actor per window
    /// when the count exceeds the threshold.
    ///
    /// This reads the durable activity log, not process memory, so the
    /// verdict is consistent across instances. Returns whether a new event
    /// was raised.
    pub async fn detect_bulk_deactivation(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let now = self.clock.now();
        let since = now - Duration::minutes(self.config.window_minutes);

        let count = self
            .activity
            .count_actions_since(org_id, actor_user_id, actions::USER_DEACTIVATE, since)
            .await
            .map_err(ServiceError::Database)?;

        if count <= self.config.bulk_deactivation_threshold {
            return Ok(false);
        }

        let existing = self
            .events
            .find_recent(
                org_id,
                SecurityEventType::BulkUserDeactivation.as_str(),
                Some(actor_user_id),
                since,
            )
            .await
            .map_err(ServiceError::Database)?;

        if existing.is_some() {
            return Ok(false);
        }

        let event = SecurityEvent::new(
            org_id,
            SecurityEventType::BulkUserDeactivation,
            Severity::High,
            format!(
                "{} user deactivations by one actor within {} minutes",
                count, self.config.window_minutes
            ),
            now,
        )
        .with_user(Some(actor_user_id))
        .with_entity("user", actor_user_id.to_string())
        .with_meta(serde_json::json!({
            "deactivations": count,
            "window_minutes": self.config.window_minutes,
        }));

        self.events
            .insert(&event)
            .await
            .map_err(ServiceError::Database)?;

        tracing::warn!(
            org_id = %org_id,
            actor_user_id = %actor_user_id,
            deactivations = count,
            "BULK_USER_DEACTIVATION security event raised"
        );

        Ok(true)
    }
}
