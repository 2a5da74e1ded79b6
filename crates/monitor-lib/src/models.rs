//! Core data models for the EBS monitor

use serde::{Deserialize, Serialize};

/// Configuration for a single monitored volume
///
/// Immutable once loaded. Volumes are only ever removed from monitoring
/// (evicted), never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// AWS EBS volume id (`vol-...`)
    pub volume_id: String,
    /// Device name the volume is attached as (`/dev/xvdf`, ...)
    pub device_name: String,
    /// AWS region the volume lives in
    pub region: String,
    /// Absolute expansion increment in GiB; takes precedence when positive
    #[serde(default)]
    pub increment_gib: u64,
    /// Percentage expansion increment, used when `increment_gib` is zero
    #[serde(default)]
    pub increment_percent: u64,
    /// Used-space percentage of filesystem capacity that triggers expansion
    pub threshold_percent: f64,
}

/// Point-in-time measurements for a monitored volume
///
/// Produced fresh each poll cycle and not retained beyond the event it
/// turns into.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeState {
    pub volume_id: String,
    pub device_name: String,
    pub mount_point: String,
    /// Provider-reported volume capacity in GiB
    pub provider_size_gib: u64,
    /// Local filesystem total size in GiB
    pub filesystem_size_gib: f64,
    /// Local filesystem used space in GiB
    pub used_gib: f64,
}

impl VolumeState {
    /// Seed a state snapshot with the identity fields of a volume config.
    ///
    /// Measured quantities stay zeroed until collection fills them in, so a
    /// snapshot produced by a failed fetch still names the volume it
    /// belongs to.
    pub fn for_volume(volume: &VolumeConfig) -> Self {
        Self {
            volume_id: volume.volume_id.clone(),
            device_name: volume.device_name.clone(),
            ..Default::default()
        }
    }
}
