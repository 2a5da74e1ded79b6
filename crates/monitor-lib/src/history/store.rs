//! Event repository with duplicate suppression and time-based pruning

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::Event;
use crate::observability::StructuredLogger;

/// Retention window for events (24 hours)
const RETENTION_HOURS: i64 = 24;

/// Per-volume event history
///
/// Cloneable handle over shared state; the poller is the only writer, the
/// HTTP API reads. The mapping and its invariants (deduplication, 24-hour
/// retention) are enforced here and not exposed.
#[derive(Clone)]
pub struct EventStore {
    events: Arc<RwLock<HashMap<String, Vec<Event>>>>,
    logger: StructuredLogger,
}

impl EventStore {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            logger,
        }
    }

    /// Pre-create an empty history for a volume so queries distinguish
    /// "known volume, no events yet" from "unknown volume"
    pub async fn register(&self, volume_id: &str) {
        let mut events = self.events.write().await;
        events.entry(volume_id.to_string()).or_default();
    }

    /// Append an event to a volume's history.
    ///
    /// A duplicate (identical timestamp, kind and success flag) is a
    /// silent no-op. Every accepted event is emitted to the log: debug
    /// level for successes, error level for failures.
    pub async fn append(&self, volume_id: &str, event: Event) {
        let mut events = self.events.write().await;
        let history = events.entry(volume_id.to_string()).or_default();

        if history.iter().any(|existing| existing.matches(&event)) {
            return;
        }

        self.logger.log_event_appended(volume_id, &event);
        history.push(event);
    }

    /// Remove events older than the retention window.
    ///
    /// Volumes whose history empties out keep their key; eviction does not
    /// erase audit history either.
    pub async fn prune(&self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(RETENTION_HOURS);
        let mut events = self.events.write().await;

        for history in events.values_mut() {
            history.retain(|event| event.recorded_at > cutoff);
        }
    }

    /// Ordered history for one volume (insertion order = chronological)
    pub async fn events(&self, volume_id: &str) -> Option<Vec<Event>> {
        let events = self.events.read().await;
        events.get(volume_id).cloned()
    }

    /// All volume ids the store knows about, including evicted ones
    pub async fn volume_ids(&self) -> Vec<String> {
        let events = self.events.read().await;
        let mut ids: Vec<String> = events.keys().cloned().collect();
        ids.sort();
        ids
    }
}
