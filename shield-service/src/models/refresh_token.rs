//! Refresh token rows - the rotation chain behind session renewal.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token entity.
///
/// Rotation links the retired row to its successor through
/// `replaced_by_token_id`, forming a singly-linked revocation chain. At most
/// one token per lineage may be active at a time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RefreshToken {
    pub token_id: Uuid,
    pub org_id: Uuid,
    pub user_id: Uuid,
    /// SHA-256 hex digest of the opaque token. The raw value is never stored.
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub replaced_by_token_id: Option<Uuid>,
}

impl RefreshToken {
    pub fn new(
        org_id: Uuid,
        user_id: Uuid,
        token_hash: String,
        expiry_days: i64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            org_id,
            user_id,
            token_hash,
            expires_at: now + Duration::days(expiry_days),
            created_at: now,
            revoked_at: None,
            replaced_by_token_id: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active = not revoked and not expired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && !self.is_expired(now)
    }
}
