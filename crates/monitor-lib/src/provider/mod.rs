//! Cloud block-storage provider abstraction
//!
//! The monitoring loop only ever talks to a [`BlockStorageProvider`];
//! the EC2 implementation lives in [`ec2`].

mod ec2;

pub use ec2::Ec2Provider;

use anyhow::Result;
use crate::models::VolumeConfig;

pub use async_trait::async_trait;

/// Modification state of a volume as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationState {
    /// No modification on record
    Idle,
    /// A size/type change is being applied
    Modifying,
    /// The change is applied and the volume is re-optimizing
    Optimizing,
    Completed,
    Failed,
}

impl ModificationState {
    /// A modification is underway; starting another resize would be
    /// rejected by the provider
    pub fn blocks_resize(&self) -> bool {
        matches!(
            self,
            ModificationState::Modifying | ModificationState::Optimizing
        )
    }

    /// The attachment has settled enough for a filesystem grow: the new
    /// capacity is visible once the modifying phase is over, even while
    /// the volume is still optimizing
    pub fn settled(&self) -> bool {
        !matches!(self, ModificationState::Modifying)
    }
}

impl std::fmt::Display for ModificationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModificationState::Idle => "idle",
            ModificationState::Modifying => "modifying",
            ModificationState::Optimizing => "optimizing",
            ModificationState::Completed => "completed",
            ModificationState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Trait for cloud block-storage access
#[async_trait]
pub trait BlockStorageProvider: Send + Sync {
    /// Provider-reported capacity of the volume in GiB
    async fn capacity_gib(&self, volume: &VolumeConfig) -> Result<u64>;

    /// Current modification state of the volume
    async fn modification_state(&self, volume: &VolumeConfig) -> Result<ModificationState>;

    /// Grow the volume to `new_size_gib`
    async fn resize(&self, volume: &VolumeConfig, new_size_gib: u64) -> Result<()>;
}
