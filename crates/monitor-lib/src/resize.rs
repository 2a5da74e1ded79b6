//! Two-phase resize protocol
//!
//! The coordinator always tries the cheap path first: growing the local
//! filesystem into capacity a previous provider resize may already have
//! made available. Only when that is not enough does it touch the
//! provider, and only once per attempt.

use std::sync::Arc;

use chrono::Utc;

use crate::error::MonitorError;
use crate::fs::HostFilesystem;
use crate::history::{Event, EventStore, FilesystemResizeAction, ProviderResizeAction};
use crate::models::VolumeConfig;
use crate::policy;
use crate::provider::BlockStorageProvider;
use crate::stabilize::Stabilizer;

/// What a resize attempt actually changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeOutcome {
    /// The provider volume was grown
    pub provider_resized: bool,
    /// The local filesystem was grown
    pub filesystem_resized: bool,
}

/// Orchestrates the two-phase resize protocol against the injected
/// provider and filesystem collaborators, recording every action into the
/// event store
pub struct ResizeCoordinator {
    provider: Arc<dyn BlockStorageProvider>,
    filesystem: Arc<dyn HostFilesystem>,
    stabilizer: Arc<dyn Stabilizer>,
    store: EventStore,
}

impl ResizeCoordinator {
    pub fn new(
        provider: Arc<dyn BlockStorageProvider>,
        filesystem: Arc<dyn HostFilesystem>,
        stabilizer: Arc<dyn Stabilizer>,
        store: EventStore,
    ) -> Self {
        Self {
            provider,
            filesystem,
            stabilizer,
            store,
        }
    }

    /// Run a resize attempt for `volume`.
    ///
    /// `requested_gib` is the capacity to request from the provider;
    /// when `None` it is derived from the provider's current capacity and
    /// the volume's expansion policy (and only on the provider path, so a
    /// phase-1 success never contacts the provider).
    ///
    /// Ordering guarantees: the filesystem is attempted before the
    /// provider is ever mutated; the provider is mutated at most once;
    /// stabilization runs only between a successful provider resize and
    /// the filesystem retry.
    pub async fn resize(
        &self,
        volume: &VolumeConfig,
        requested_gib: Option<u64>,
    ) -> Result<ResizeOutcome, MonitorError> {
        let state_fetch = |source: anyhow::Error| MonitorError::StateFetch {
            volume_id: volume.volume_id.clone(),
            source,
        };

        let mount_point = self
            .filesystem
            .mount_point(&volume.volume_id)
            .await
            .map_err(state_fetch)?;

        let filesystem_size_gib = self
            .filesystem
            .filesystem_size_gib(&mount_point)
            .await
            .map_err(state_fetch)?;

        // Phase 1: grow the filesystem into any capacity a previous
        // provider resize already made available
        if self
            .try_grow_filesystem(volume, &mount_point, filesystem_size_gib, requested_gib)
            .await
            .is_ok()
        {
            return Ok(ResizeOutcome {
                provider_resized: false,
                filesystem_resized: true,
            });
        }

        // Phase 2: refuse to stack provider modifications
        let modification = self
            .provider
            .modification_state(volume)
            .await
            .map_err(state_fetch)?;

        if modification.blocks_resize() {
            return Err(MonitorError::ConcurrentModification {
                volume_id: volume.volume_id.clone(),
                state: modification.to_string(),
            });
        }

        let current_gib = self
            .provider
            .capacity_gib(volume)
            .await
            .map_err(state_fetch)?;

        let requested_gib =
            requested_gib.unwrap_or_else(|| policy::expanded_size(volume, current_gib));

        let action = ProviderResizeAction {
            started_at: Utc::now(),
            volume_id: volume.volume_id.clone(),
            device_name: volume.device_name.clone(),
            region: volume.region.clone(),
            original_size_gib: current_gib,
            requested_size_gib: requested_gib,
        };

        match self.provider.resize(volume, requested_gib).await {
            Ok(()) => {
                self.store
                    .append(&volume.volume_id, Event::provider_resize(action, true))
                    .await;
            }
            Err(source) => {
                self.store
                    .append(&volume.volume_id, Event::provider_resize(action, false))
                    .await;
                return Err(MonitorError::ProviderResize {
                    volume_id: volume.volume_id.clone(),
                    requested_gib,
                    source,
                });
            }
        }

        // Let the attachment settle before the filesystem sees the new
        // capacity
        self.stabilizer
            .wait_until_stable(self.provider.as_ref(), volume)
            .await;

        // Phase 3: the device now has more capacity; grow into it
        match self
            .try_grow_filesystem(volume, &mount_point, filesystem_size_gib, Some(requested_gib))
            .await
        {
            Ok(()) => Ok(ResizeOutcome {
                provider_resized: true,
                filesystem_resized: true,
            }),
            Err(source) => Err(MonitorError::FilesystemResize {
                mount_point,
                provider_resized: true,
                source,
            }),
        }
    }

    /// Attempt a filesystem grow and record the attempt either way
    async fn try_grow_filesystem(
        &self,
        volume: &VolumeConfig,
        mount_point: &str,
        original_size_gib: f64,
        requested_gib: Option<u64>,
    ) -> anyhow::Result<()> {
        let action = FilesystemResizeAction {
            started_at: Utc::now(),
            volume_id: volume.volume_id.clone(),
            device_name: volume.device_name.clone(),
            mount_point: mount_point.to_string(),
            original_size_gib,
            requested_size_gib: requested_gib,
        };

        match self.filesystem.grow(mount_point).await {
            Ok(()) => {
                self.store
                    .append(&volume.volume_id, Event::filesystem_resize(action, true))
                    .await;
                Ok(())
            }
            Err(err) => {
                self.store
                    .append(&volume.volume_id, Event::filesystem_resize(action, false))
                    .await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::EventKind;
    use crate::observability::StructuredLogger;
    use crate::provider::ModificationState;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock provider tracking every call
    struct MockProvider {
        capacity: u64,
        modification: ModificationState,
        resize_fails: bool,
        capacity_calls: AtomicUsize,
        state_calls: AtomicUsize,
        resize_calls: AtomicUsize,
        last_requested: Mutex<Option<u64>>,
    }

    impl MockProvider {
        fn new(capacity: u64, modification: ModificationState) -> Self {
            Self {
                capacity,
                modification,
                resize_fails: false,
                capacity_calls: AtomicUsize::new(0),
                state_calls: AtomicUsize::new(0),
                resize_calls: AtomicUsize::new(0),
                last_requested: Mutex::new(None),
            }
        }

        fn failing_resize(mut self) -> Self {
            self.resize_fails = true;
            self
        }

        fn total_calls(&self) -> usize {
            self.capacity_calls.load(Ordering::SeqCst)
                + self.state_calls.load(Ordering::SeqCst)
                + self.resize_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BlockStorageProvider for MockProvider {
        async fn capacity_gib(&self, _volume: &VolumeConfig) -> Result<u64> {
            self.capacity_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.capacity)
        }

        async fn modification_state(&self, _volume: &VolumeConfig) -> Result<ModificationState> {
            self.state_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.modification)
        }

        async fn resize(&self, _volume: &VolumeConfig, new_size_gib: u64) -> Result<()> {
            self.resize_calls.fetch_add(1, Ordering::SeqCst);
            *self.last_requested.lock().unwrap() = Some(new_size_gib);
            if self.resize_fails {
                Err(anyhow!("ModifyVolume rejected"))
            } else {
                Ok(())
            }
        }
    }

    /// Mock filesystem replaying scripted grow outcomes
    struct MockFilesystem {
        grow_outcomes: Mutex<VecDeque<Result<(), String>>>,
        grow_calls: AtomicUsize,
    }

    impl MockFilesystem {
        fn new(grow_outcomes: Vec<Result<(), String>>) -> Self {
            Self {
                grow_outcomes: Mutex::new(grow_outcomes.into()),
                grow_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HostFilesystem for MockFilesystem {
        async fn mount_point(&self, _volume_id: &str) -> Result<String> {
            Ok("/data".to_string())
        }

        async fn filesystem_size_gib(&self, _mount_point: &str) -> Result<f64> {
            Ok(99.5)
        }

        async fn used_gib(&self, _mount_point: &str) -> Result<f64> {
            Ok(85.0)
        }

        async fn grow(&self, _mount_point: &str) -> Result<()> {
            self.grow_calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self
                .grow_outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err("no scripted outcome".to_string()));
            outcome.map_err(|msg| anyhow!(msg))
        }
    }

    /// Stabilizer that only counts invocations
    #[derive(Default)]
    struct CountingStabilizer {
        waits: AtomicUsize,
    }

    #[async_trait]
    impl Stabilizer for CountingStabilizer {
        async fn wait_until_stable(
            &self,
            _provider: &dyn BlockStorageProvider,
            _volume: &VolumeConfig,
        ) {
            self.waits.fetch_add(1, Ordering::SeqCst);
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

    struct Harness {
        provider: Arc<MockProvider>,
        filesystem: Arc<MockFilesystem>,
        stabilizer: Arc<CountingStabilizer>,
        store: EventStore,
        coordinator: ResizeCoordinator,
    }

    fn harness(provider: MockProvider, filesystem: MockFilesystem) -> Harness {
        let provider = Arc::new(provider);
        let filesystem = Arc::new(filesystem);
        let stabilizer = Arc::new(CountingStabilizer::default());
        let store = EventStore::new(StructuredLogger::new("test-host"));
        let coordinator = ResizeCoordinator::new(
            provider.clone(),
            filesystem.clone(),
            stabilizer.clone(),
            store.clone(),
        );
        Harness {
            provider,
            filesystem,
            stabilizer,
            store,
            coordinator,
        }
    }

    #[tokio::test]
    async fn test_phase1_success_never_contacts_provider() {
        let h = harness(
            MockProvider::new(100, ModificationState::Idle),
            MockFilesystem::new(vec![Ok(())]),
        );

        let outcome = h.coordinator.resize(&volume(), Some(110)).await.unwrap();

        assert!(outcome.filesystem_resized);
        assert!(!outcome.provider_resized);
        assert_eq!(h.provider.total_calls(), 0);
        assert_eq!(h.stabilizer.waits.load(Ordering::SeqCst), 0);

        let events = h.store.events("vol-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].success);
        assert!(matches!(events[0].kind, EventKind::FilesystemResize(_)));
    }

    #[tokio::test]
    async fn test_in_progress_modification_aborts_without_resize() {
        let h = harness(
            MockProvider::new(100, ModificationState::Optimizing),
            MockFilesystem::new(vec![Err("nothing to grow".to_string())]),
        );

        let err = h.coordinator.resize(&volume(), Some(110)).await.unwrap_err();

        assert!(matches!(err, MonitorError::ConcurrentModification { .. }));
        assert_eq!(h.provider.resize_calls.load(Ordering::SeqCst), 0);

        // Only the failed phase-1 filesystem attempt is on record
        let events = h.store.events("vol-1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
    }

    #[tokio::test]
    async fn test_provider_failure_is_recorded_and_surfaced() {
        let h = harness(
            MockProvider::new(100, ModificationState::Idle).failing_resize(),
            MockFilesystem::new(vec![Err("nothing to grow".to_string())]),
        );

        let err = h.coordinator.resize(&volume(), Some(110)).await.unwrap_err();

        assert!(matches!(err, MonitorError::ProviderResize { .. }));
        assert!(!err.provider_resized());
        // No stabilization and no filesystem retry after a failed resize
        assert_eq!(h.stabilizer.waits.load(Ordering::SeqCst), 0);
        assert_eq!(h.filesystem.grow_calls.load(Ordering::SeqCst), 1);

        let events = h.store.events("vol-1").await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1].kind, EventKind::ProviderResize(_)));
        assert!(!events[1].success);
    }

    #[tokio::test]
    async fn test_full_two_phase_resize() {
        let h = harness(
            MockProvider::new(100, ModificationState::Idle),
            MockFilesystem::new(vec![Err("nothing to grow".to_string()), Ok(())]),
        );

        let outcome = h.coordinator.resize(&volume(), Some(110)).await.unwrap();

        assert!(outcome.provider_resized);
        assert!(outcome.filesystem_resized);
        assert_eq!(h.provider.resize_calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.provider.last_requested.lock().unwrap(), Some(110));
        assert_eq!(h.stabilizer.waits.load(Ordering::SeqCst), 1);

        let events = h.store.events("vol-1").await.unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.kind.label()).collect();
        assert_eq!(
            kinds,
            vec!["filesystem_resize", "provider_resize", "filesystem_resize"]
        );
        assert!(!events[0].success);
        assert!(events[1].success);
        assert!(events[2].success);
    }

    #[tokio::test]
    async fn test_partial_success_surfaces_provider_resize() {
        let h = harness(
            MockProvider::new(100, ModificationState::Idle),
            MockFilesystem::new(vec![
                Err("nothing to grow".to_string()),
                Err("resize2fs failed".to_string()),
            ]),
        );

        let err = h.coordinator.resize(&volume(), Some(110)).await.unwrap_err();

        assert!(matches!(
            err,
            MonitorError::FilesystemResize {
                provider_resized: true,
                ..
            }
        ));
        assert!(err.provider_resized());
        assert_eq!(h.provider.resize_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_requested_size_derived_from_policy_when_absent() {
        let h = harness(
            MockProvider::new(100, ModificationState::Idle),
            MockFilesystem::new(vec![Err("nothing to grow".to_string()), Ok(())]),
        );

        h.coordinator.resize(&volume(), None).await.unwrap();

        // increment_gib = 10 on top of the provider-reported 100
        assert_eq!(*h.provider.last_requested.lock().unwrap(), Some(110));
        assert_eq!(h.provider.capacity_calls.load(Ordering::SeqCst), 1);
    }
}
