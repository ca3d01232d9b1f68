//! In-memory stores backing the test suite and standalone development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    ActivityLog, ApiTokenStore, Directory, RefreshTokenStore, SecurityEventFilter,
    SecurityEventStore, StoreHealth,
};
use crate::models::{
    ActivityEntry, ApiToken, DirectoryUser, Membership, RefreshToken, SecurityEvent,
};

/// One struct implements every store trait; share it through `Arc` and let
/// the coercions hand out the narrow views.
#[derive(Default)]
pub struct MemoryStores {
    pub refresh_tokens: Mutex<HashMap<Uuid, RefreshToken>>,
    pub api_tokens: Mutex<HashMap<Uuid, ApiToken>>,
    pub security_events: Mutex<Vec<SecurityEvent>>,
    pub activity: Mutex<Vec<ActivityEntry>>,
    pub users: Mutex<HashMap<Uuid, DirectoryUser>>,
    pub memberships: Mutex<Vec<Membership>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_user(&self, user: DirectoryUser, membership: Membership) {
        self.users
            .lock()
            .expect("users mutex poisoned")
            .insert(user.user_id, user);
        self.memberships
            .lock()
            .expect("memberships mutex poisoned")
            .push(membership);
    }

    pub fn seed_api_token(&self, token: ApiToken) {
        self.api_tokens
            .lock()
            .expect("api tokens mutex poisoned")
            .insert(token.token_id, token);
    }
}

fn poisoned(which: &str) -> anyhow::Error {
    anyhow::anyhow!("{} mutex poisoned", which)
}

#[async_trait]
impl StoreHealth for MemoryStores {
    async fn ping(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStores {
    async fn insert(&self, token: &RefreshToken) -> Result<(), anyhow::Error> {
        self.refresh_tokens
            .lock()
            .map_err(|_| poisoned("refresh tokens"))?
            .insert(token.token_id, token.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, anyhow::Error> {
        let tokens = self
            .refresh_tokens
            .lock()
            .map_err(|_| poisoned("refresh tokens"))?;
        Ok(tokens.values().find(|t| t.token_hash == token_hash).cloned())
    }

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<RefreshToken>, anyhow::Error> {
        let tokens = self
            .refresh_tokens
            .lock()
            .map_err(|_| poisoned("refresh tokens"))?;
        Ok(tokens.get(&token_id).cloned())
    }

    async fn revoke(&self, token_id: Uuid, now: DateTime<Utc>) -> Result<(), anyhow::Error> {
        let mut tokens = self
            .refresh_tokens
            .lock()
            .map_err(|_| poisoned("refresh tokens"))?;
        if let Some(token) = tokens.get_mut(&token_id) {
            if token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
        }
        Ok(())
    }

    async fn rotate(
        &self,
        old_id: Uuid,
        replacement: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        // Single lock guards both writes, mirroring the transactional
        // all-or-nothing of the Postgres implementation.
        let mut tokens = self
            .refresh_tokens
            .lock()
            .map_err(|_| poisoned("refresh tokens"))?;

        match tokens.get_mut(&old_id) {
            Some(old) if old.revoked_at.is_none() => {
                old.revoked_at = Some(now);
                old.replaced_by_token_id = Some(replacement.token_id);
            }
            _ => return Ok(false),
        }

        tokens.insert(replacement.token_id, replacement.clone());
        Ok(true)
    }
}

#[async_trait]
impl ApiTokenStore for MemoryStores {
    async fn insert(&self, token: &ApiToken) -> Result<(), anyhow::Error> {
        self.api_tokens
            .lock()
            .map_err(|_| poisoned("api tokens"))?
            .insert(token.token_id, token.clone());
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<ApiToken>, anyhow::Error> {
        let tokens = self.api_tokens.lock().map_err(|_| poisoned("api tokens"))?;
        Ok(tokens.values().find(|t| t.token_hash == token_hash).cloned())
    }

    async fn find_active_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<ApiToken>, anyhow::Error> {
        let tokens = self.api_tokens.lock().map_err(|_| poisoned("api tokens"))?;
        Ok(tokens
            .values()
            .find(|t| t.token_hash == token_hash && t.revoked_at.is_none())
            .cloned())
    }

    async fn find_by_id(&self, token_id: Uuid) -> Result<Option<ApiToken>, anyhow::Error> {
        let tokens = self.api_tokens.lock().map_err(|_| poisoned("api tokens"))?;
        Ok(tokens.get(&token_id).cloned())
    }

    async fn record_usage(
        &self,
        token_id: Uuid,
        requests_this_hour: i64,
        hour_window_start: DateTime<Utc>,
        last_used_at: Option<DateTime<Utc>>,
    ) -> Result<(), anyhow::Error> {
        let mut tokens = self.api_tokens.lock().map_err(|_| poisoned("api tokens"))?;
        if let Some(token) = tokens.get_mut(&token_id) {
            token.requests_this_hour = requests_this_hour;
            token.hour_window_start = hour_window_start;
            if last_used_at.is_some() {
                token.last_used_at = last_used_at;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SecurityEventStore for MemoryStores {
    async fn insert(&self, event: &SecurityEvent) -> Result<(), anyhow::Error> {
        self.security_events
            .lock()
            .map_err(|_| poisoned("security events"))?
            .push(event.clone());
        Ok(())
    }

    async fn list(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, anyhow::Error> {
        let events = self
            .security_events
            .lock()
            .map_err(|_| poisoned("security events"))?;

        let mut matching: Vec<SecurityEvent> = events
            .iter()
            .filter(|e| filter.org_id.map_or(true, |org| e.org_id == org))
            .filter(|e| {
                filter
                    .severity
                    .as_deref()
                    .map_or(true, |sev| e.severity == sev)
            })
            .filter(|e| filter.resolved.map_or(true, |r| e.is_resolved() == r))
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn find_by_id(&self, event_id: Uuid) -> Result<Option<SecurityEvent>, anyhow::Error> {
        let events = self
            .security_events
            .lock()
            .map_err(|_| poisoned("security events"))?;
        Ok(events.iter().find(|e| e.event_id == event_id).cloned())
    }

    async fn find_recent(
        &self,
        org_id: Uuid,
        event_type: &str,
        user_id: Option<Uuid>,
        since: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error> {
        let events = self
            .security_events
            .lock()
            .map_err(|_| poisoned("security events"))?;
        Ok(events
            .iter()
            .filter(|e| e.org_id == org_id && e.event_type == event_type)
            .filter(|e| user_id.map_or(true, |u| e.user_id == Some(u)))
            .filter(|e| e.created_at >= since)
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn resolve(
        &self,
        event_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<SecurityEvent>, anyhow::Error> {
        let mut events = self
            .security_events
            .lock()
            .map_err(|_| poisoned("security events"))?;
        match events.iter_mut().find(|e| e.event_id == event_id) {
            Some(event) => {
                if event.resolved_at.is_none() {
                    event.resolved_at = Some(now);
                }
                Ok(Some(event.clone()))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActivityLog for MemoryStores {
    async fn append(&self, entry: &ActivityEntry) -> Result<(), anyhow::Error> {
        self.activity
            .lock()
            .map_err(|_| poisoned("activity"))?
            .push(entry.clone());
        Ok(())
    }

    async fn count_actions_since(
        &self,
        org_id: Uuid,
        actor_user_id: Uuid,
        action: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, anyhow::Error> {
        let activity = self.activity.lock().map_err(|_| poisoned("activity"))?;
        Ok(activity
            .iter()
            .filter(|e| {
                e.org_id == org_id
                    && e.actor_user_id == Some(actor_user_id)
                    && e.action == action
                    && e.created_at >= since
            })
            .count() as i64)
    }
}

#[async_trait]
impl Directory for MemoryStores {
    async fn find_user_by_email(
        &self,
        org_id: Uuid,
        email: &str,
    ) -> Result<Option<DirectoryUser>, anyhow::Error> {
        let memberships = self
            .memberships
            .lock()
            .map_err(|_| poisoned("memberships"))?;
        let users = self.users.lock().map_err(|_| poisoned("users"))?;

        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .filter(|u| {
                memberships
                    .iter()
                    .any(|m| m.org_id == org_id && m.user_id == u.user_id)
            })
            .cloned())
    }

    async fn find_user_by_id(
        &self,
        user_id: Uuid,
    ) -> Result<Option<DirectoryUser>, anyhow::Error> {
        let users = self.users.lock().map_err(|_| poisoned("users"))?;
        Ok(users.get(&user_id).cloned())
    }

    async fn find_membership(
        &self,
        org_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, anyhow::Error> {
        let memberships = self
            .memberships
            .lock()
            .map_err(|_| poisoned("memberships"))?;
        Ok(memberships
            .iter()
            .find(|m| m.org_id == org_id && m.user_id == user_id)
            .cloned())
    }
}
