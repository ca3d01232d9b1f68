//! Operator review surface over the security event store.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::SecurityEvent;
use crate::services::{Clock, ServiceError};
use crate::stores::{SecurityEventFilter, SecurityEventStore};

#[derive(Clone)]
pub struct SecurityEventService {
    events: Arc<dyn SecurityEventStore>,
    clock: Arc<dyn Clock>,
}

impl SecurityEventService {
    pub fn new(events: Arc<dyn SecurityEventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { events, clock }
    }

    pub async fn list(
        &self,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>, ServiceError> {
        self.events
            .list(filter)
            .await
            .map_err(ServiceError::Database)
    }

    /// Mark an event reviewed. Resolving twice is a no-op; the first
    /// `resolved_at` wins.
    pub async fn resolve(&self, event_id: Uuid) -> Result<SecurityEvent, ServiceError> {
        let now = self.clock.now();
        self.events
            .resolve(event_id, now)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::NotFound)
    }
}
