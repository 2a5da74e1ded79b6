//! Post-resize stabilization
//!
//! After a provider-side resize the attachment needs a moment before the
//! new capacity is visible to the filesystem tools. The strategy is
//! injectable so the resize protocol can be tested without real waiting.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use crate::models::VolumeConfig;
use crate::observability::StructuredLogger;
use crate::provider::BlockStorageProvider;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Strategy for waiting out the window between a provider resize and the
/// filesystem grow
#[async_trait]
pub trait Stabilizer: Send + Sync {
    /// Block until the volume modification has settled enough for a
    /// filesystem grow, or until the strategy gives up
    async fn wait_until_stable(&self, provider: &dyn BlockStorageProvider, volume: &VolumeConfig);
}

/// Poll the provider's modification state with multiplicative backoff
/// until the modifying phase is over, bounded by a total timeout.
///
/// On timeout the wait ends with a warning rather than an error: a
/// premature filesystem grow surfaces as an ordinary failure and is
/// retried next cycle.
pub struct PollUntilStable {
    poll_interval: Duration,
    backoff_factor: f64,
    max_wait: Duration,
    logger: StructuredLogger,
}

impl PollUntilStable {
    pub fn new(logger: StructuredLogger) -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_wait: DEFAULT_MAX_WAIT,
            logger,
        }
    }

    /// Override the polling cadence (mainly for tests)
    pub fn with_timing(
        mut self,
        poll_interval: Duration,
        backoff_factor: f64,
        max_wait: Duration,
    ) -> Self {
        self.poll_interval = poll_interval;
        self.backoff_factor = backoff_factor;
        self.max_wait = max_wait;
        self
    }
}

#[async_trait]
impl Stabilizer for PollUntilStable {
    async fn wait_until_stable(&self, provider: &dyn BlockStorageProvider, volume: &VolumeConfig) {
        let mut waited = Duration::ZERO;
        let mut interval = self.poll_interval;

        loop {
            match provider.modification_state(volume).await {
                Ok(state) if state.settled() => {
                    debug!(
                        volume_id = %volume.volume_id,
                        state = %state,
                        waited_secs = waited.as_secs(),
                        "Volume modification settled"
                    );
                    return;
                }
                Ok(state) => {
                    debug!(
                        volume_id = %volume.volume_id,
                        state = %state,
                        "Volume modification still in progress"
                    );
                }
                // A failed poll is not fatal; keep waiting
                Err(err) => {
                    debug!(
                        volume_id = %volume.volume_id,
                        error = %err,
                        "State poll failed during stabilization"
                    );
                }
            }

            if waited >= self.max_wait {
                self.logger
                    .log_stabilization_timeout(&volume.volume_id, waited.as_secs());
                return;
            }

            sleep(interval).await;
            waited += interval;
            interval = interval.mul_f64(self.backoff_factor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModificationState;
    use anyhow::Result;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider stub that replays a fixed sequence of modification states
    struct ScriptedProvider {
        states: Mutex<VecDeque<ModificationState>>,
        polls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(states: Vec<ModificationState>) -> Self {
            Self {
                states: Mutex::new(states.into()),
                polls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlockStorageProvider for ScriptedProvider {
        async fn capacity_gib(&self, _volume: &VolumeConfig) -> Result<u64> {
            Ok(100)
        }

        async fn modification_state(&self, _volume: &VolumeConfig) -> Result<ModificationState> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut states = self.states.lock().unwrap();
            Ok(states.pop_front().unwrap_or(ModificationState::Modifying))
        }

        async fn resize(&self, _volume: &VolumeConfig, _new_size_gib: u64) -> Result<()> {
            Ok(())
        }
    }

    fn volume() -> VolumeConfig {
        VolumeConfig {
            volume_id: "vol-1".to_string(),
            device_name: "/dev/xvdf".to_string(),
            region: "eu-west-1".to_string(),
            increment_gib: 10,
            increment_percent: 0,
            threshold_percent: 80.0,
        }
    }

    fn fast_stabilizer() -> PollUntilStable {
        PollUntilStable::new(StructuredLogger::new("test-host")).with_timing(
            Duration::from_millis(1),
            1.0,
            Duration::from_millis(20),
        )
    }

    #[tokio::test]
    async fn test_returns_once_settled() {
        let provider = ScriptedProvider::new(vec![
            ModificationState::Modifying,
            ModificationState::Modifying,
            ModificationState::Optimizing,
        ]);

        fast_stabilizer()
            .wait_until_stable(&provider, &volume())
            .await;

        assert_eq!(provider.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_settled_immediately_needs_one_poll() {
        let provider = ScriptedProvider::new(vec![ModificationState::Completed]);

        fast_stabilizer()
            .wait_until_stable(&provider, &volume())
            .await;

        assert_eq!(provider.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_wait() {
        // Provider stays in modifying forever; the wait must still end
        let provider = ScriptedProvider::new(vec![]);

        fast_stabilizer()
            .wait_until_stable(&provider, &volume())
            .await;

        let polls = provider.polls.load(Ordering::SeqCst);
        assert!(polls > 1, "should have polled more than once");
        assert!(polls <= 25, "polling must be bounded, got {}", polls);
    }
}
