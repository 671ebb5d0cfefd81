//! Long-lived profiler service: owns the aggregate store and the sampling
//! on/off state machine, and starts the sampler cadence once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{ProfilerConfig, RECOMMENDED_MIN_INTERVAL};
use crate::export::health::HealthMetrics;
use crate::export::render_folded;
use crate::sampler::{self, Sampler, SamplerHandle};
use crate::snapshot::SnapshotProvider;
use crate::store::AggregateStore;

/// Owns the profiler state for the lifetime of the process.
///
/// States are {Stopped, Sampling}, initial Stopped. `start_sampling` and
/// `stop_sampling` only flip the flag; the background cadence is created
/// once by [`FlameGraphService::spawn_sampler`] and lives until shutdown.
pub struct FlameGraphService {
    cfg: ProfilerConfig,
    provider: Arc<dyn SnapshotProvider>,
    store: Arc<AggregateStore>,
    sampling: Arc<AtomicBool>,
    health: Arc<HealthMetrics>,
    handle: parking_lot::Mutex<Option<SamplerHandle>>,
}

impl FlameGraphService {
    pub fn new(
        cfg: ProfilerConfig,
        provider: Arc<dyn SnapshotProvider>,
        health: Arc<HealthMetrics>,
    ) -> Self {
        let store = Arc::new(AggregateStore::new(cfg.max_stored_stacks));

        Self {
            cfg,
            provider,
            store,
            sampling: Arc::new(AtomicBool::new(false)),
            health,
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Starts the background sampling cadence. Idempotent: subsequent calls
    /// are no-ops, and nothing is spawned when the profiler is disabled.
    pub fn spawn_sampler(&self, cancel: CancellationToken) -> Result<()> {
        if !self.cfg.enabled {
            info!("profiler disabled, sampler not started");
            return Ok(());
        }

        let mut slot = self.handle.lock();
        if slot.is_some() {
            return Ok(());
        }

        if self.cfg.sample_interval < RECOMMENDED_MIN_INTERVAL {
            warn!(
                interval = ?self.cfg.sample_interval,
                recommended_min = ?RECOMMENDED_MIN_INTERVAL,
                "sample interval below recommended minimum, expect visible overhead",
            );
        }

        let sampler = Sampler::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            Arc::clone(&self.sampling),
            self.cfg.max_depth,
            Arc::clone(&self.health),
        );

        *slot = Some(sampler::spawn(
            sampler,
            self.cfg.sample_interval,
            self.cfg.startup_delay,
            cancel,
        )?);

        info!(
            interval = ?self.cfg.sample_interval,
            startup_delay = ?self.cfg.startup_delay,
            max_depth = self.cfg.max_depth,
            max_stored_stacks = self.cfg.max_stored_stacks,
            "flame graph sampler initialized, ready to start",
        );

        Ok(())
    }

    /// Begins sampling. Idempotent.
    pub fn start_sampling(&self) {
        self.sampling.store(true, Ordering::Relaxed);
        self.health.sampling.set(1.0);
        info!("flame graph sampling started");
    }

    /// Pauses sampling. Idempotent. Collected data is kept.
    pub fn stop_sampling(&self) {
        self.sampling.store(false, Ordering::Relaxed);
        self.health.sampling.set(0.0);
        info!(
            unique_stacks = self.store.len(),
            "flame graph sampling stopped",
        );
    }

    /// Whether sampling is currently active. No side effects.
    pub fn is_sampling(&self) -> bool {
        self.sampling.load(Ordering::Relaxed)
    }

    /// Clears all aggregated data. Sampling state is unaffected.
    pub fn reset(&self) {
        self.store.reset();
        self.health.distinct_signatures.set(0.0);
        info!("flame graph data cleared");
    }

    /// Renders the current aggregate as folded-stack text.
    pub fn dump_folded(&self) -> String {
        render_folded(&self.store.dump())
    }

    pub fn store(&self) -> &AggregateStore {
        &self.store
    }

    /// Joins the sampler thread. Call after cancelling its token.
    pub fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().take() {
            handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ThreadSnapshot;

    struct EmptyProvider;

    impl SnapshotProvider for EmptyProvider {
        fn snapshot(&self) -> Result<Vec<ThreadSnapshot>> {
            Ok(Vec::new())
        }
    }

    fn service() -> FlameGraphService {
        FlameGraphService::new(
            ProfilerConfig::default(),
            Arc::new(EmptyProvider),
            Arc::new(HealthMetrics::new().expect("metrics build")),
        )
    }

    #[test]
    fn test_initial_state_is_stopped() {
        assert!(!service().is_sampling());
    }

    #[test]
    fn test_start_stop_idempotent() {
        let svc = service();

        svc.start_sampling();
        assert!(svc.is_sampling());
        svc.start_sampling();
        assert!(svc.is_sampling());

        svc.stop_sampling();
        assert!(!svc.is_sampling());
        svc.stop_sampling();
        assert!(!svc.is_sampling());
    }

    #[test]
    fn test_status_has_no_side_effect() {
        let svc = service();
        svc.start_sampling();
        for _ in 0..3 {
            assert!(svc.is_sampling());
        }
    }

    #[test]
    fn test_reset_keeps_sampling_state() {
        let svc = service();
        svc.start_sampling();
        svc.store().record("a;b");
        svc.reset();

        assert!(svc.store().is_empty());
        assert!(svc.is_sampling());
        assert_eq!(svc.dump_folded(), "");
    }

    #[test]
    fn test_spawn_sampler_disabled_is_noop() {
        let cfg = ProfilerConfig {
            enabled: false,
            ..ProfilerConfig::default()
        };
        let svc = FlameGraphService::new(
            cfg,
            Arc::new(EmptyProvider),
            Arc::new(HealthMetrics::new().expect("metrics build")),
        );

        let cancel = CancellationToken::new();
        svc.spawn_sampler(cancel.child_token()).expect("spawn");
        assert!(svc.handle.lock().is_none());
        svc.shutdown();
    }

    #[test]
    fn test_spawn_sampler_idempotent() {
        let svc = service();
        let cancel = CancellationToken::new();

        svc.spawn_sampler(cancel.child_token()).expect("spawn");
        svc.spawn_sampler(cancel.child_token()).expect("respawn is a no-op");

        cancel.cancel();
        svc.shutdown();
    }
}
