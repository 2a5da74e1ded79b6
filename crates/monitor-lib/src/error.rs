//! Error taxonomy for the monitoring loop
//!
//! Every variant except the empty-set condition is recoverable: the poller
//! records it, bumps the volume's failure count and retries next cycle.

use thiserror::Error;

/// Failures surfaced by the monitoring loop and the resize protocol
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Could not gather a volume state snapshot (provider query, mount
    /// resolution or filesystem stat failed)
    #[error("failed to fetch state for volume {volume_id}: {source}")]
    StateFetch {
        volume_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The provider reported a volume modification already in progress;
    /// the resize attempt is aborted and retried next cycle
    #[error("volume {volume_id} has a modification in progress ({state}), resize aborted")]
    ConcurrentModification { volume_id: String, state: String },

    /// The provider-side resize call failed
    #[error("provider resize of volume {volume_id} to {requested_gib} GiB failed: {source}")]
    ProviderResize {
        volume_id: String,
        requested_gib: u64,
        #[source]
        source: anyhow::Error,
    },

    /// The local filesystem grow failed. `provider_resized` distinguishes
    /// a plain failure from a partial success where the provider volume
    /// was already grown
    #[error("filesystem grow for {mount_point} failed (provider resized: {provider_resized}): {source}")]
    FilesystemResize {
        mount_point: String,
        provider_resized: bool,
        #[source]
        source: anyhow::Error,
    },

    /// No volumes left under monitoring; fatal for the process
    #[error("no volumes left to monitor")]
    EmptyActiveSet,
}

impl MonitorError {
    /// True when a provider-side resize took effect despite the overall
    /// operation failing
    pub fn provider_resized(&self) -> bool {
        matches!(
            self,
            MonitorError::FilesystemResize {
                provider_resized: true,
                ..
            }
        )
    }
}
