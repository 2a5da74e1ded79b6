//! Event records for the per-volume history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::VolumeState;

/// A provider-side resize action and the sizes involved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResizeAction {
    pub started_at: DateTime<Utc>,
    pub volume_id: String,
    pub device_name: String,
    pub region: String,
    pub original_size_gib: u64,
    pub requested_size_gib: u64,
}

/// A local filesystem grow action and the sizes involved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilesystemResizeAction {
    pub started_at: DateTime<Utc>,
    pub volume_id: String,
    pub device_name: String,
    pub mount_point: String,
    /// Filesystem size in GiB before the grow attempt
    pub original_size_gib: f64,
    /// Provider capacity in GiB the grow is expected to consume, when known
    pub requested_size_gib: Option<u64>,
}

/// What an event records: exactly one observation or action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "detail")]
pub enum EventKind {
    StateObservation(VolumeState),
    ProviderResize(ProviderResizeAction),
    FilesystemResize(FilesystemResizeAction),
}

impl EventKind {
    /// Short label used in log records and API output
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::StateObservation(_) => "state_observation",
            EventKind::ProviderResize(_) => "provider_resize",
            EventKind::FilesystemResize(_) => "filesystem_resize",
        }
    }
}

/// An immutable, timestamped record of one observation or action taken on
/// a volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub recorded_at: DateTime<Utc>,
    pub success: bool,
    pub kind: EventKind,
}

impl Event {
    pub fn state_observation(state: VolumeState, success: bool) -> Self {
        Self {
            recorded_at: Utc::now(),
            success,
            kind: EventKind::StateObservation(state),
        }
    }

    pub fn provider_resize(action: ProviderResizeAction, success: bool) -> Self {
        Self {
            recorded_at: Utc::now(),
            success,
            kind: EventKind::ProviderResize(action),
        }
    }

    pub fn filesystem_resize(action: FilesystemResizeAction, success: bool) -> Self {
        Self {
            recorded_at: Utc::now(),
            success,
            kind: EventKind::FilesystemResize(action),
        }
    }

    /// Duplicate check: two events match when timestamp, recorded kind and
    /// success flag are all identical. This is the store's deduplication
    /// key.
    pub fn matches(&self, other: &Event) -> bool {
        self.recorded_at == other.recorded_at
            && self.success == other.success
            && self.kind == other.kind
    }
}
