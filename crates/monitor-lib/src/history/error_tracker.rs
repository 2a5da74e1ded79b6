//! Consecutive-failure tracking for the eviction policy

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

/// Consecutive failures before a volume is evicted from monitoring
pub const EVICTION_THRESHOLD: u32 = 5;

/// Per-volume consecutive-failure counters
///
/// Cloneable handle over shared state; only the poller writes. Counters
/// survive eviction so the history stays inspectable.
#[derive(Clone, Default)]
pub struct ErrorTracker {
    counts: Arc<RwLock<HashMap<String, u32>>>,
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed cycle outcome; returns the new consecutive count
    pub async fn record_failure(&self, volume_id: &str) -> u32 {
        let mut counts = self.counts.write().await;
        let count = counts.entry(volume_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Record a successful cycle outcome, resetting the counter to zero
    pub async fn record_success(&self, volume_id: &str) {
        let mut counts = self.counts.write().await;
        counts.insert(volume_id.to_string(), 0);
    }

    /// Current consecutive-failure count for a volume
    pub async fn count(&self, volume_id: &str) -> u32 {
        let counts = self.counts.read().await;
        counts.get(volume_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failures_accumulate() {
        let tracker = ErrorTracker::new();

        for expected in 1..=4 {
            assert_eq!(tracker.record_failure("vol-1").await, expected);
        }
        assert_eq!(tracker.count("vol-1").await, 4);
    }

    #[tokio::test]
    async fn test_success_resets_count() {
        let tracker = ErrorTracker::new();

        tracker.record_failure("vol-1").await;
        tracker.record_failure("vol-1").await;
        tracker.record_success("vol-1").await;

        assert_eq!(tracker.count("vol-1").await, 0);
    }

    #[tokio::test]
    async fn test_fifth_failure_reaches_eviction_threshold() {
        let tracker = ErrorTracker::new();

        for _ in 0..4 {
            tracker.record_failure("vol-1").await;
        }
        let count = tracker.record_failure("vol-1").await;

        assert_eq!(count, EVICTION_THRESHOLD);
    }

    #[tokio::test]
    async fn test_counters_are_per_volume() {
        let tracker = ErrorTracker::new();

        tracker.record_failure("vol-1").await;
        assert_eq!(tracker.count("vol-2").await, 0);
    }
}
