//! Failed-login buckets.
//!
//! Deliberately process-local (detection sensitivity degrades with horizontal
//! scale, which the platform accepts); kept behind a trait so a shared cache
//! can be swapped in and so tests can drive it deterministically.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Result of recording one failure: how many attempts remain in the window
/// after pruning, and when an event was last raised for this key.
#[derive(Debug, Clone, Copy)]
pub struct FailureSnapshot {
    pub attempts_in_window: usize,
    pub last_event_at: Option<DateTime<Utc>>,
}

pub trait FailureBucketStore: Send + Sync {
    /// Prune timestamps older than `window_start`, append `now`, and return
    /// the resulting snapshot.
    fn record_failure(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> FailureSnapshot;

    /// Remember that an event was raised for this key at `now`.
    fn note_event(&self, key: &str, now: DateTime<Utc>);

    /// Drop the bucket entirely. Called on every successful login.
    fn clear(&self, key: &str);
}

#[derive(Debug, Default)]
struct FailedLoginBucket {
    timestamps: Vec<DateTime<Utc>>,
    last_event_at: Option<DateTime<Utc>>,
}

/// Process-local bucket store.
#[derive(Debug, Default)]
pub struct InMemoryFailureBuckets {
    buckets: DashMap<String, FailedLoginBucket>,
}

impl InMemoryFailureBuckets {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FailureBucketStore for InMemoryFailureBuckets {
    fn record_failure(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window_start: DateTime<Utc>,
    ) -> FailureSnapshot {
        let mut bucket = self.buckets.entry(key.to_string()).or_default();
        bucket.timestamps.retain(|t| *t >= window_start);
        bucket.timestamps.push(now);

        FailureSnapshot {
            attempts_in_window: bucket.timestamps.len(),
            last_event_at: bucket.last_event_at,
        }
    }

    fn note_event(&self, key: &str, now: DateTime<Utc>) {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            bucket.last_event_at = Some(now);
        }
    }

    fn clear(&self, key: &str) {
        self.buckets.remove(key);
    }
}
