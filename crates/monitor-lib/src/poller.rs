//! The monitoring loop
//!
//! One logical loop processes the monitored volumes strictly
//! sequentially: fetch a state snapshot, record it, evaluate the resize
//! threshold, drive the resize protocol when exceeded, then prune the
//! history and sleep. Volumes that keep failing are evicted; an empty
//! active set ends the process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::MonitorError;
use crate::fs::HostFilesystem;
use crate::health::{components, HealthRegistry};
use crate::history::{ErrorTracker, Event, EventStore, EVICTION_THRESHOLD};
use crate::models::{VolumeConfig, VolumeState};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::policy;
use crate::provider::BlockStorageProvider;
use crate::resize::ResizeCoordinator;
use crate::stabilize::Stabilizer;

/// Configuration for the monitoring loop
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Pause between passes over the active set (default: 60 seconds)
    pub interval: Duration,
    /// Consecutive failures before a volume is evicted
    pub eviction_threshold: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            eviction_threshold: EVICTION_THRESHOLD,
        }
    }
}

/// The top-level scheduling loop over the monitored volumes
///
/// Owns the active set exclusively; eviction rebuilds the set from the
/// survivors of each pass instead of splicing entries out mid-iteration.
pub struct Poller {
    volumes: Vec<VolumeConfig>,
    provider: Arc<dyn BlockStorageProvider>,
    filesystem: Arc<dyn HostFilesystem>,
    coordinator: ResizeCoordinator,
    store: EventStore,
    errors: ErrorTracker,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    config: PollerConfig,
}

impl Poller {
    /// Run until shutdown is signalled or the active set empties out.
    ///
    /// The empty-set condition is fatal and returned to the caller; a
    /// shutdown signal ends the loop cleanly.
    pub async fn run(
        mut self,
        mut shutdown: tokio::sync::broadcast::Receiver<()>,
    ) -> Result<(), MonitorError> {
        info!(
            interval_secs = self.config.interval.as_secs(),
            volumes = self.volumes.len(),
            "Starting monitoring loop"
        );

        for volume in &self.volumes {
            self.store.register(&volume.volume_id).await;
        }

        loop {
            if self.volumes.is_empty() {
                return Err(self.fail_empty().await);
            }

            let start = Instant::now();
            let before = self.volumes.len();
            self.volumes = self.run_pass().await;

            self.metrics.set_volumes_monitored(self.volumes.len() as i64);
            self.metrics
                .observe_cycle_duration(start.elapsed().as_secs_f64());

            self.store.prune(Utc::now()).await;

            if self.volumes.is_empty() {
                return Err(self.fail_empty().await);
            }
            // A pass with an eviction leaves the degraded status in place
            if self.volumes.len() == before {
                self.health.set_healthy(components::POLLER).await;
            }

            tokio::select! {
                _ = sleep(self.config.interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down monitoring loop");
                    return Ok(());
                }
            }
        }
    }

    async fn fail_empty(&self) -> MonitorError {
        self.logger.log_no_volumes_left();
        self.health
            .set_unhealthy(components::POLLER, "No volumes left to monitor")
            .await;
        MonitorError::EmptyActiveSet
    }

    /// One pass over the active set; returns the surviving volumes
    async fn run_pass(&self) -> Vec<VolumeConfig> {
        let mut survivors = Vec::with_capacity(self.volumes.len());

        for volume in &self.volumes {
            let failed = self.run_cycle(volume).await;

            if failed {
                let count = self.errors.count(&volume.volume_id).await;
                if count >= self.config.eviction_threshold {
                    self.logger.log_eviction(&volume.volume_id, count);
                    self.metrics.inc_evictions();
                    self.health
                        .set_degraded(
                            components::POLLER,
                            format!("volume {} evicted", volume.volume_id),
                        )
                        .await;
                    continue;
                }
            }

            survivors.push(volume.clone());
        }

        survivors
    }

    /// One cycle for one volume; returns whether the cycle failed
    async fn run_cycle(&self, volume: &VolumeConfig) -> bool {
        let state = match self.fetch_state(volume).await {
            Err((partial, err)) => {
                let count = self.errors.record_failure(&volume.volume_id).await;
                self.metrics.inc_state_fetch_errors();
                warn!(
                    volume_id = %volume.volume_id,
                    error = %err,
                    failure_count = count,
                    "Failed to fetch volume state"
                );
                self.store
                    .append(&volume.volume_id, Event::state_observation(partial, false))
                    .await;
                return true;
            }
            Ok(state) => state,
        };

        self.errors.record_success(&volume.volume_id).await;
        self.store
            .append(
                &volume.volume_id,
                Event::state_observation(state.clone(), true),
            )
            .await;

        if state.filesystem_size_gib <= 0.0 {
            warn!(
                volume_id = %volume.volume_id,
                mount_point = %state.mount_point,
                "Filesystem reports zero capacity, skipping threshold evaluation"
            );
            return false;
        }

        let check = policy::threshold_check(
            state.used_gib,
            state.filesystem_size_gib,
            volume.threshold_percent,
        );

        if !check.exceeded {
            debug!(
                volume_id = %volume.volume_id,
                used_gib = state.used_gib,
                filesystem_size_gib = state.filesystem_size_gib,
                "Below resize threshold"
            );
            return false;
        }

        self.logger
            .log_threshold_exceeded(&state, check.exceeded_by_gib);

        // The snapshot already carries the provider capacity, so the
        // requested size costs no extra provider call
        let requested_gib = policy::expanded_size(volume, state.provider_size_gib);

        self.metrics.inc_resize_attempts();
        let start = Instant::now();
        let result = self.coordinator.resize(volume, Some(requested_gib)).await;
        self.metrics
            .observe_resize_duration(start.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                if outcome.provider_resized {
                    self.metrics.inc_provider_resizes();
                }
                if outcome.filesystem_resized {
                    self.metrics.inc_filesystem_resizes();
                }
                self.errors.record_success(&volume.volume_id).await;
                self.logger.log_resize_outcome(
                    &volume.volume_id,
                    &volume.device_name,
                    requested_gib,
                    outcome.provider_resized,
                    outcome.filesystem_resized,
                    None,
                );
                false
            }
            Err(err) => {
                self.metrics.inc_resize_failures();
                if err.provider_resized() {
                    // The provider grow took effect even though the
                    // attempt as a whole failed
                    self.metrics.inc_provider_resizes();
                }
                self.errors.record_failure(&volume.volume_id).await;
                self.logger.log_resize_outcome(
                    &volume.volume_id,
                    &volume.device_name,
                    requested_gib,
                    err.provider_resized(),
                    false,
                    Some(&err.to_string()),
                );
                true
            }
        }
    }

    /// Gather a fresh state snapshot. On failure the partially filled
    /// snapshot is returned alongside the error so the failed observation
    /// still names what it measured.
    async fn fetch_state(
        &self,
        volume: &VolumeConfig,
    ) -> Result<VolumeState, (VolumeState, anyhow::Error)> {
        let mut state = VolumeState::for_volume(volume);

        let mount_point = match self.filesystem.mount_point(&volume.volume_id).await {
            Ok(mount_point) => mount_point,
            Err(err) => return Err((state, err)),
        };
        state.mount_point = mount_point;

        match self.provider.capacity_gib(volume).await {
            Ok(size) => state.provider_size_gib = size,
            Err(err) => return Err((state, err)),
        }

        match self.filesystem.filesystem_size_gib(&state.mount_point).await {
            Ok(size) => state.filesystem_size_gib = size,
            Err(err) => return Err((state, err)),
        }

        match self.filesystem.used_gib(&state.mount_point).await {
            Ok(used) => state.used_gib = used,
            Err(err) => return Err((state, err)),
        }

        Ok(state)
    }
}

/// Builder for wiring up the monitoring loop
pub struct PollerBuilder {
    volumes: Vec<VolumeConfig>,
    provider: Option<Arc<dyn BlockStorageProvider>>,
    filesystem: Option<Arc<dyn HostFilesystem>>,
    stabilizer: Option<Arc<dyn Stabilizer>>,
    store: Option<EventStore>,
    errors: ErrorTracker,
    health: HealthRegistry,
    metrics: Option<MonitorMetrics>,
    logger: Option<StructuredLogger>,
    config: PollerConfig,
}

impl PollerBuilder {
    pub fn new(volumes: Vec<VolumeConfig>) -> Self {
        Self {
            volumes,
            provider: None,
            filesystem: None,
            stabilizer: None,
            store: None,
            errors: ErrorTracker::new(),
            health: HealthRegistry::new(),
            metrics: None,
            logger: None,
            config: PollerConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn BlockStorageProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn filesystem(mut self, filesystem: Arc<dyn HostFilesystem>) -> Self {
        self.filesystem = Some(filesystem);
        self
    }

    pub fn stabilizer(mut self, stabilizer: Arc<dyn Stabilizer>) -> Self {
        self.stabilizer = Some(stabilizer);
        self
    }

    pub fn store(mut self, store: EventStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn errors(mut self, errors: ErrorTracker) -> Self {
        self.errors = errors;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn eviction_threshold(mut self, threshold: u32) -> Self {
        self.config.eviction_threshold = threshold;
        self
    }

    pub fn build(self) -> Result<Poller> {
        let provider = self
            .provider
            .ok_or_else(|| anyhow::anyhow!("Provider is required"))?;
        let filesystem = self
            .filesystem
            .ok_or_else(|| anyhow::anyhow!("Filesystem is required"))?;
        let stabilizer = self
            .stabilizer
            .ok_or_else(|| anyhow::anyhow!("Stabilizer is required"))?;
        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("unknown"));
        let store = self
            .store
            .unwrap_or_else(|| EventStore::new(logger.clone()));
        let metrics = self.metrics.unwrap_or_default();

        let coordinator = ResizeCoordinator::new(
            provider.clone(),
            filesystem.clone(),
            stabilizer,
            store.clone(),
        );

        Ok(Poller {
            volumes: self.volumes,
            provider,
            filesystem,
            coordinator,
            store,
            errors: self.errors,
            health: self.health,
            metrics,
            logger,
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModificationState;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct StubProvider {
        capacity: u64,
        resize_calls: AtomicUsize,
        last_requested: Mutex<Option<u64>>,
    }

    impl StubProvider {
        fn new(capacity: u64) -> Self {
            Self {
                capacity,
                resize_calls: AtomicUsize::new(0),
                last_requested: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl BlockStorageProvider for StubProvider {
        async fn capacity_gib(&self, _volume: &VolumeConfig) -> Result<u64> {
            Ok(self.capacity)
        }

        async fn modification_state(&self, _volume: &VolumeConfig) -> Result<ModificationState> {
            Ok(ModificationState::Idle)
        }

        async fn resize(&self, _volume: &VolumeConfig, new_size_gib: u64) -> Result<()> {
            self.resize_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_requested.lock().unwrap() = Some(new_size_gib);
            Ok(())
        }
    }

    struct StubFilesystem {
        /// Mount resolution fails, making every state fetch fail
        unmountable: bool,
        used_gib: f64,
        grow_outcomes: Mutex<VecDeque<Result<(), String>>>,
    }

    impl StubFilesystem {
        fn healthy(used_gib: f64, grow_outcomes: Vec<Result<(), String>>) -> Self {
            Self {
                unmountable: false,
                used_gib,
                grow_outcomes: Mutex::new(grow_outcomes.into()),
            }
        }

        fn unmountable() -> Self {
            Self {
                unmountable: true,
                used_gib: 0.0,
                grow_outcomes: Mutex::new(VecDeque::new()),
            }
        }
    }

    #[async_trait]
    impl HostFilesystem for StubFilesystem {
        async fn mount_point(&self, _volume_id: &str) -> Result<String> {
            if self.unmountable {
                Err(anyhow!("volume not found in lsblk output"))
            } else {
                Ok("/data".to_string())
            }
        }

        async fn filesystem_size_gib(&self, _mount_point: &str) -> Result<f64> {
            Ok(100.0)
        }

        async fn used_gib(&self, _mount_point: &str) -> Result<f64> {
            Ok(self.used_gib)
        }

        async fn grow(&self, _mount_point: &str) -> Result<()> {
            let outcome = self
                .grow_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(()));
            outcome.map_err(|msg| anyhow!(msg))
        }
    }

    struct InstantStabilizer;

    #[async_trait]
    impl Stabilizer for InstantStabilizer {
        async fn wait_until_stable(
            &self,
            _provider: &dyn BlockStorageProvider,
            _volume: &VolumeConfig,
        ) {
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

    fn poller(
        volumes: Vec<VolumeConfig>,
        provider: Arc<StubProvider>,
        filesystem: Arc<StubFilesystem>,
    ) -> Poller {
        PollerBuilder::new(volumes)
            .provider(provider)
            .filesystem(filesystem)
            .stabilizer(Arc::new(InstantStabilizer))
            .logger(StructuredLogger::new("test-host"))
            .interval(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let result = PollerBuilder::new(vec![volume()]).build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_failing_volume_evicted_after_threshold() {
        let provider = Arc::new(StubProvider::new(100));
        let filesystem = Arc::new(StubFilesystem::unmountable());
        let poller = poller(vec![volume()], provider, filesystem);

        // Four failing passes keep the volume under monitoring
        for pass in 1..=4 {
            let survivors = poller.run_pass().await;
            assert_eq!(survivors.len(), 1, "pass {} should not evict", pass);
        }

        // The fifth consecutive failure evicts
        let survivors = poller.run_pass().await;
        assert!(survivors.is_empty());
        assert_eq!(poller.errors.count("vol-1").await, 5);

        // Failed observations were recorded for audit
        let events = poller.store.events("vol-1").await.unwrap();
        assert!(events.iter().all(|e| !e.success));
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let provider = Arc::new(StubProvider::new(100));
        let poller = poller(
            vec![volume()],
            provider,
            Arc::new(StubFilesystem::healthy(10.0, vec![])),
        );

        poller.errors.record_failure("vol-1").await;
        poller.errors.record_failure("vol-1").await;

        let survivors = poller.run_pass().await;
        assert_eq!(survivors.len(), 1);
        assert_eq!(poller.errors.count("vol-1").await, 0);
    }

    #[tokio::test]
    async fn test_below_threshold_does_not_resize() {
        let provider = Arc::new(StubProvider::new(100));
        let poller = poller(
            vec![volume()],
            provider.clone(),
            Arc::new(StubFilesystem::healthy(50.0, vec![])),
        );

        poller.run_pass().await;

        assert_eq!(provider.resize_calls.load(Ordering::SeqCst), 0);
        let events = poller.store.events("vol-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
    }

    #[tokio::test]
    async fn test_threshold_breach_drives_provider_resize() {
        let provider = Arc::new(StubProvider::new(100));
        // Phase-1 grow finds nothing to consume, phase-3 grow succeeds
        let filesystem = Arc::new(StubFilesystem::healthy(
            85.0,
            vec![Err("nothing to grow".to_string()), Ok(())],
        ));
        let poller = poller(vec![volume()], provider.clone(), filesystem);

        let survivors = poller.run_pass().await;

        assert_eq!(survivors.len(), 1);
        assert_eq!(provider.resize_calls.load(Ordering::SeqCst), 1);
        // Snapshot capacity 100 + absolute increment 10
        assert_eq!(*provider.last_requested.lock().unwrap(), Some(110));
        assert_eq!(poller.errors.count("vol-1").await, 0);
    }

    #[tokio::test]
    async fn test_run_fails_fast_on_empty_set() {
        let provider = Arc::new(StubProvider::new(100));
        let poller = poller(vec![], provider, Arc::new(StubFilesystem::unmountable()));

        let (_tx, rx) = tokio::sync::broadcast::channel(1);
        let err = poller.run(rx).await.unwrap_err();

        assert!(matches!(err, MonitorError::EmptyActiveSet));
    }

    #[tokio::test]
    async fn test_shutdown_ends_loop_cleanly() {
        let provider = Arc::new(StubProvider::new(100));
        let poller = poller(
            vec![volume()],
            provider,
            Arc::new(StubFilesystem::healthy(10.0, vec![])),
        );

        let (tx, rx) = tokio::sync::broadcast::channel(1);
        tx.send(()).unwrap();

        poller.run(rx).await.unwrap();
    }
}
