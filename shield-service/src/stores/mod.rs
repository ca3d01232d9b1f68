//! Persistence boundaries.
//!
//! The shield core talks to durable storage through these traits only. The
//! Postgres implementations are the production wiring; the in-memory ones
//! back the test suite and standalone development.

mod buckets;
mod memory;
mod postgres;

pub use buckets::{FailureBucketStore, FailureSnapshot, InMemoryFailureBuckets};
pub use memory::MemoryStores;
pub use postgres::{create_pool, run_migrations, PostgresStores};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    ActivityEntry, ApiToken, DirectoryUser, Membership, RefreshToken, SecurityEvent,
};

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, token: &RefreshToken) -> Result<(), anyhow::Error>;

    async fn find_by_hash(&self, token_hash: &str)
        -> Result<Option<RefreshToken>, anyhow::Error>;

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<RefreshToken>, anyhow::Error>;

    async fn revoke(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), anyhow::Error>;

    /// Atomically insert `replacement` and revoke `old_id`, linking the chain
    /// through `replaced_by_token_id`. Returns false when `old_id` was already
    /// revoked by a concurrent rotation; in that case nothing is written.
    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error>;
}

#[async_trait]
pub trait ApiTokenStore: Send + Sync {
    async fn insert(&self, token: &ApiToken) -> Result<(), anyhow::Error>;

    /// Any row matching the hash, revoked or not. Used only to attribute
    /// usage-audit logging for denied attempts.
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, anyhow::Error>;

    /// The active row (`revoked_at IS NULL`). Only this lookup may authorize.
    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ApiToken>, anyhow::Error>;

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<ApiToken>, anyhow::Error>;

    /// Persist the hourly window counters. `last_used_at` is only updated
    /// when the request was admitted.
    async fn record_usage(
        &self,
        token_id: Uuid,
        requests_this_hour: i64,
        hour_window_start: DateTime<Utc>,
        last_used_at: Option<DateTime<Utc>>,
    ) -> Result<(), anyhow::Error>;
}

/// Filters for the operator review surface.
#[derive(Debug, Clone)]
pub struct SecurityEventFilter {
    pub org_id: Option<Uuid>,
    pub severity: Option<String>,
    pub resolved: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for SecurityEventFilter {
    fn default() -> Self {
        Self {
            org_id: None,
            severity: None,
            resolved: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait SecurityEventStore: Send + Sync {
    async fn insert(&self, event: &SecurityEvent) -> Result<(), anyhow::Error>;

    async fn list(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, anyhow::Error>;

    async fn find_by_id(&self, event_id: Uuid) -> Result<Option<SecurityEvent>, anyhow::Error>;

    /// Latest event of `event_type` raised for the org (and actor, when
    /// given) since `since`. Used to bound event volume per window.
    async fn find_recent(
        &self,
        org_id: Uuid,
        event_type: &str,
        user_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error>;

    /// Set `resolved_at` once; resolving an already-resolved event is a
    /// no-op. Returns the row, or None when the id is unknown.
    async fn resolve(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error>;
}

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), anyhow::Error>;

    async fn count_actions_since(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error>;
}

/// Read-only lookups into the platform directory. This core never mutates
/// domain records.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_user_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, anyhow::Error>;

    async fn find_user_by_id(&self, user_id: Uuid)
        -> Result<Option<DirectoryUser>, anyhow::Error>;

    async fn find_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, anyhow::Error>;
}

/// Connectivity probe for the health endpoint.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), anyhow::Error>;
}
