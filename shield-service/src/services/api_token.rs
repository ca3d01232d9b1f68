//! API token authentication and the per-token hourly quota.

use std::sync::Arc;

use crate::models::{actions, ActivityEntry, ApiToken, ServiceIdentity};
use crate::services::token_crypto::{constant_time_equals, sha256_hex};
use crate::services::{Clock, ServiceError};
use crate::stores::{ActivityLog, ApiTokenStore};

#[derive(Clone)]
pub struct ApiTokenService {
    tokens: Arc<dyn ApiTokenStore>,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
}

impl ApiTokenService {
    pub fn new(
        tokens: Arc<dyn ApiTokenStore>,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            activity,
            clock,
        }
    }

    /// Authenticate a long-lived bearer credential and consume one request
    /// from its hourly quota.
    pub async fn authenticate(&self, raw_token: &str) -> Result<ServiceIdentity, ServiceError> {
        // Cheap rejection before any hashing or lookup work.
        if !ApiToken::matches_shape(raw_token) {
            return Err(ServiceError::InvalidApiToken);
        }

        let computed_hash = sha256_hex(raw_token);

        // Unfiltered lookup: attributes usage-audit logging even to revoked
        // or otherwise denied tokens. Never authorizes anything.
        let attributed = self
            .tokens
            .find_by_hash(&computed_hash)
            .await
            .map_err(ServiceError::Database)?;

        // Only the active row may authorize.
        let active = self
            .tokens
            .find_active_by_hash(&computed_hash)
            .await
            .map_err(ServiceError::Database)?;

        let token = match active {
            Some(token) => token,
            None => {
                if let Some(revoked) = attributed {
                    tracing::warn!(
                        token_id = %revoked.token_id,
                        org_id = %revoked.org_id,
                        "Revoked API token presented"
                    );
                    self.log_denied_attempt(&revoked, "revoked");
                }
                return Err(ServiceError::InvalidApiToken);
            }
        };

        // The lookup already matched on equality; re-verify through the
        // constant-time comparator so this path carries no timing signal.
        if !constant_time_equals(&token.token_hash, &computed_hash) {
            return Err(ServiceError::InvalidApiToken);
        }

        let now = self.clock.now();
        let (baseline, window_start) = if token.window_expired(now) {
            (0, now)
        } else {
            (token.requests_this_hour, token.hour_window_start)
        };
        let next = baseline + 1;

        if next > token.rate_limit_per_hour {
            // Counter still advances on denied requests; last_used_at does not.
            self.tokens
                .record_usage(token.token_id, next, window_start, None)
                .await
                .map_err(ServiceError::Database)?;

            tracing::warn!(
                token_id = %token.token_id,
                org_id = %token.org_id,
                limit = token.rate_limit_per_hour,
                "API token rate limit exceeded"
            );
            self.log_denied_attempt(&token, "rate_limited");
            return Err(ServiceError::RateLimited);
        }

        self.tokens
            .record_usage(token.token_id, next, window_start, Some(now))
            .await
            .map_err(ServiceError::Database)?;

        Ok(ServiceIdentity {
            token_id: token.token_id,
            org_id: token.org_id,
            role: token.role.clone(),
            scopes: token.scopes.0.clone(),
        })
    }

    // Fire-and-forget: attribution of a denied attempt must never delay or
    // fail the response.
    fn log_denied_attempt(&self, token: &ApiToken, reason: &str) {
        let entry = ActivityEntry::new(token.org_id, actions::API_TOKEN_USED, "api_token")
            .with_entity_id(token.token_id.to_string())
            .with_after(serde_json::json!({
                "success": false,
                "reason": reason,
            }));

        let activity = self.activity.clone();
        tokio::spawn(async move {
            if let Err(e) = activity.append(&entry).await {
                tracing::debug!(error = %e, "Failed to record denied API token attempt");
            }
        });
    }
}
