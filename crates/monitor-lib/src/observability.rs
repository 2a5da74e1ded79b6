//! Observability infrastructure for the EBS monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, resize counters, eviction counter)
//! - Structured JSON logging with tracing

use prometheus::{register_histogram, register_int_gauge, Histogram, IntGauge};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

use crate::history::Event;
use crate::models::VolumeState;

/// Histogram buckets for poll-cycle and resize durations (in seconds)
const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct MonitorMetricsInner {
    cycle_duration_seconds: Histogram,
    resize_duration_seconds: Histogram,
    volumes_monitored: IntGauge,
    state_fetch_errors: IntGauge,
    resize_attempts: IntGauge,
    provider_resizes: IntGauge,
    filesystem_resizes: IntGauge,
    resize_failures: IntGauge,
    evictions: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "ebs_monitor_cycle_duration_seconds",
                "Time spent on one full pass over the monitored volumes",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            resize_duration_seconds: register_histogram!(
                "ebs_monitor_resize_duration_seconds",
                "Time spent inside a single resize attempt",
                DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register resize_duration_seconds"),

            volumes_monitored: register_int_gauge!(
                "ebs_monitor_volumes_monitored",
                "Number of volumes currently under monitoring"
            )
            .expect("Failed to register volumes_monitored"),

            state_fetch_errors: register_int_gauge!(
                "ebs_monitor_state_fetch_errors_total",
                "Total number of failed volume state fetches"
            )
            .expect("Failed to register state_fetch_errors_total"),

            resize_attempts: register_int_gauge!(
                "ebs_monitor_resize_attempts_total",
                "Total number of resize attempts started"
            )
            .expect("Failed to register resize_attempts_total"),

            provider_resizes: register_int_gauge!(
                "ebs_monitor_provider_resizes_total",
                "Total number of successful provider volume resizes"
            )
            .expect("Failed to register provider_resizes_total"),

            filesystem_resizes: register_int_gauge!(
                "ebs_monitor_filesystem_resizes_total",
                "Total number of successful filesystem grows"
            )
            .expect("Failed to register filesystem_resizes_total"),

            resize_failures: register_int_gauge!(
                "ebs_monitor_resize_failures_total",
                "Total number of resize attempts that returned an error"
            )
            .expect("Failed to register resize_failures_total"),

            evictions: register_int_gauge!(
                "ebs_monitor_evictions_total",
                "Total number of volumes evicted after repeated failures"
            )
            .expect("Failed to register evictions_total"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_duration(&self, duration_secs: f64) {
        self.inner().cycle_duration_seconds.observe(duration_secs);
    }

    pub fn observe_resize_duration(&self, duration_secs: f64) {
        self.inner().resize_duration_seconds.observe(duration_secs);
    }

    pub fn set_volumes_monitored(&self, count: i64) {
        self.inner().volumes_monitored.set(count);
    }

    pub fn inc_state_fetch_errors(&self) {
        self.inner().state_fetch_errors.inc();
    }

    pub fn inc_resize_attempts(&self) {
        self.inner().resize_attempts.inc();
    }

    pub fn inc_provider_resizes(&self) {
        self.inner().provider_resizes.inc();
    }

    pub fn inc_filesystem_resizes(&self) {
        self.inner().filesystem_resizes.inc();
    }

    pub fn inc_resize_failures(&self) {
        self.inner().resize_failures.inc();
    }

    pub fn inc_evictions(&self) {
        self.inner().evictions.inc();
    }
}

/// Structured logger for monitor events
///
/// Constructed once at process start and passed to the components that
/// emit event-shaped records; never a global mutable singleton.
#[derive(Clone)]
pub struct StructuredLogger {
    host_name: String,
}

impl StructuredLogger {
    pub fn new(host_name: impl Into<String>) -> Self {
        Self {
            host_name: host_name.into(),
        }
    }

    /// Log an accepted history event: debug level for successes, error
    /// level for failures
    pub fn log_event_appended(&self, volume_id: &str, event: &Event) {
        if event.success {
            debug!(
                event = "history_event",
                host = %self.host_name,
                volume_id = %volume_id,
                kind = event.kind.label(),
                recorded_at = %event.recorded_at,
                success = true,
                "Recorded volume event"
            );
        } else {
            error!(
                event = "history_event",
                host = %self.host_name,
                volume_id = %volume_id,
                kind = event.kind.label(),
                recorded_at = %event.recorded_at,
                success = false,
                "Recorded failed volume event"
            );
        }
    }

    /// Log a threshold breach that will trigger a resize attempt
    pub fn log_threshold_exceeded(&self, state: &VolumeState, exceeded_by_gib: f64) {
        info!(
            event = "threshold_exceeded",
            host = %self.host_name,
            volume_id = %state.volume_id,
            device_name = %state.device_name,
            used_gib = state.used_gib,
            filesystem_size_gib = state.filesystem_size_gib,
            exceeded_by_gib = exceeded_by_gib,
            "Used space exceeded resize threshold"
        );
    }

    /// Log the outcome of a resize attempt
    pub fn log_resize_outcome(
        &self,
        volume_id: &str,
        device_name: &str,
        requested_gib: u64,
        provider_resized: bool,
        filesystem_resized: bool,
        error: Option<&str>,
    ) {
        match error {
            None => {
                info!(
                    event = "resize_completed",
                    host = %self.host_name,
                    volume_id = %volume_id,
                    device_name = %device_name,
                    requested_gib = requested_gib,
                    provider_resized = provider_resized,
                    filesystem_resized = filesystem_resized,
                    "Volume resized"
                );
            }
            Some(err) => {
                error!(
                    event = "resize_failed",
                    host = %self.host_name,
                    volume_id = %volume_id,
                    device_name = %device_name,
                    requested_gib = requested_gib,
                    provider_resized = provider_resized,
                    filesystem_resized = filesystem_resized,
                    error = %err,
                    "Resize attempt failed"
                );
            }
        }
    }

    /// Log a volume being removed from monitoring after repeated failures
    pub fn log_eviction(&self, volume_id: &str, failure_count: u32) {
        error!(
            event = "volume_evicted",
            host = %self.host_name,
            volume_id = %volume_id,
            failure_count = failure_count,
            "Volume removed from monitoring due to recurrent errors"
        );
    }

    /// Log the fatal empty-set condition
    pub fn log_no_volumes_left(&self) {
        error!(
            event = "monitoring_exhausted",
            host = %self.host_name,
            "No volumes left to monitor"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, volume_count: usize, interval_secs: u64) {
        info!(
            event = "monitor_started",
            host = %self.host_name,
            version = %version,
            volume_count = volume_count,
            interval_secs = interval_secs,
            "EBS monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host_name,
            reason = %reason,
            "EBS monitor shutting down"
        );
    }

    /// Log a stabilization wait that gave up before the provider settled
    pub fn log_stabilization_timeout(&self, volume_id: &str, waited_secs: u64) {
        warn!(
            event = "stabilization_timeout",
            host = %self.host_name,
            volume_id = %volume_id,
            waited_secs = waited_secs,
            "Volume modification still settling, proceeding with filesystem grow"
        );
    }
}
