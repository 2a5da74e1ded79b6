//! Core library for the EBS monitor daemon
//!
//! This crate provides the core functionality for:
//! - Volume state collection (AWS EBS + local filesystem)
//! - Threshold evaluation and expansion sizing
//! - The two-phase resize protocol
//! - Per-volume event history and eviction tracking
//! - Health checks and observability

pub mod error;
pub mod fs;
pub mod health;
pub mod history;
pub mod models;
pub mod observability;
pub mod policy;
pub mod poller;
pub mod provider;
pub mod resize;
pub mod stabilize;

pub use error::MonitorError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{ErrorTracker, Event, EventKind, EventStore, EVICTION_THRESHOLD};
pub use models::*;
pub use observability::{MonitorMetrics, StructuredLogger};
pub use poller::{Poller, PollerBuilder, PollerConfig};
pub use resize::{ResizeCoordinator, ResizeOutcome};
