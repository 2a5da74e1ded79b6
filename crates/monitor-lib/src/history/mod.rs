//! Per-volume event history and failure tracking
//!
//! This module provides:
//! - Immutable, timestamped event records for observations and actions
//! - An owned event repository with duplicate suppression and 24-hour
//!   retention
//! - Consecutive-failure counting driving the eviction policy

mod error_tracker;
mod event;
mod store;

pub use error_tracker::{ErrorTracker, EVICTION_THRESHOLD};
pub use event::{Event, EventKind, FilesystemResizeAction, ProviderResizeAction};
pub use store::EventStore;
