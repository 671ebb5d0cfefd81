//! Periodic sampling driver: once per tick, snapshot all live threads,
//! filter, collapse, and record into the aggregate store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::collapse::collapse;
use crate::export::health::HealthMetrics;
use crate::snapshot::{SnapshotProvider, ThreadSnapshot, ThreadState};
use crate::store::AggregateStore;

/// Name of the dedicated sampler thread, used by the filter to keep the
/// profiler from profiling itself.
pub const SAMPLER_THREAD_NAME: &str = "flameprof-sampler";

/// Per-tick sampling logic, independent of the cadence that drives it.
pub struct Sampler {
    provider: Arc<dyn SnapshotProvider>,
    store: Arc<AggregateStore>,
    sampling: Arc<AtomicBool>,
    max_depth: usize,
    health: Arc<HealthMetrics>,
}

impl Sampler {
    pub fn new(
        provider: Arc<dyn SnapshotProvider>,
        store: Arc<AggregateStore>,
        sampling: Arc<AtomicBool>,
        max_depth: usize,
        health: Arc<HealthMetrics>,
    ) -> Self {
        Self {
            provider,
            store,
            sampling,
            max_depth,
            health,
        }
    }

    /// Executes one tick body. When the sampling flag is off this is a
    /// no-op, which keeps resume latency at one interval with no thread
    /// startup cost.
    ///
    /// Returns whether any stack was recorded this tick.
    pub fn tick(&self) -> Result<bool> {
        if !self.sampling.load(Ordering::Relaxed) {
            return Ok(false);
        }

        let threads = self
            .provider
            .snapshot()
            .context("snapshotting live threads")?;

        let mut captured = false;
        for thread in &threads {
            if !keep_thread(thread) {
                continue;
            }

            let signature = collapse(&thread.frames, self.max_depth);
            if self.store.record(&signature) {
                self.health.samples_captured.inc();
                captured = true;
            } else {
                self.health.samples_dropped.inc();
            }
        }

        Ok(captured)
    }
}

/// Decides whether a snapshotted thread contributes a sample.
///
/// Only Running and BlockedOnLock threads count; Waiting/TimedWaiting are
/// idle time and would dominate the graph with sleep stacks. The sampler's
/// own thread and threads without frames are skipped.
fn keep_thread(thread: &ThreadSnapshot) -> bool {
    if !matches!(
        thread.state,
        ThreadState::Running | ThreadState::BlockedOnLock
    ) {
        return false;
    }

    if thread.name == SAMPLER_THREAD_NAME {
        return false;
    }

    !thread.frames.is_empty()
}

/// Handle to the dedicated sampler thread.
pub struct SamplerHandle {
    thread: thread::JoinHandle<()>,
}

impl SamplerHandle {
    /// Waits for the sampler thread to exit. Call after cancelling its token.
    pub fn join(self) {
        if self.thread.join().is_err() {
            error!("sampler thread panicked");
        }
    }
}

/// Spawns the fixed-rate sampling cadence on a dedicated named thread.
///
/// The cadence runs until `cancel` fires; `start`/`stop` toggles never touch
/// it. The first tick happens after `startup_delay`.
pub fn spawn(
    sampler: Sampler,
    interval: Duration,
    startup_delay: Duration,
    cancel: CancellationToken,
) -> Result<SamplerHandle> {
    let thread = thread::Builder::new()
        .name(SAMPLER_THREAD_NAME.to_string())
        .spawn(move || run(sampler, interval, startup_delay, cancel))
        .context("spawning sampler thread")?;

    Ok(SamplerHandle { thread })
}

fn run(sampler: Sampler, interval: Duration, startup_delay: Duration, cancel: CancellationToken) {
    // A current-thread runtime keeps every tick on this one named thread,
    // so ticks serialize and the filter can exclude the sampler by identity.
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "building sampler runtime failed");
            return;
        }
    };

    rt.block_on(async move {
        let first_tick = tokio::time::Instant::now() + startup_delay;
        let mut ticker = tokio::time::interval_at(first_tick, interval);
        // An overrunning tick delays the next one instead of overlapping it.
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    sampler.health.ticks_total.inc();
                    let started = std::time::Instant::now();

                    match sampler.tick() {
                        Ok(true) => debug!("captured stacks in this cycle"),
                        Ok(false) => {}
                        // A failed tick is reported and swallowed; the
                        // schedule must survive transient introspection
                        // failures.
                        Err(e) => {
                            sampler.health.snapshot_errors.inc();
                            error!(error = %e, "sampling tick failed");
                        }
                    }

                    sampler
                        .health
                        .tick_duration
                        .observe(started.elapsed().as_secs_f64());
                    sampler
                        .health
                        .distinct_signatures
                        .set(sampler.store.len() as f64);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Frame;

    struct FixedProvider {
        threads: Vec<ThreadSnapshot>,
    }

    impl SnapshotProvider for FixedProvider {
        fn snapshot(&self) -> Result<Vec<ThreadSnapshot>> {
            Ok(self.threads.clone())
        }
    }

    struct FailingProvider;

    impl SnapshotProvider for FailingProvider {
        fn snapshot(&self) -> Result<Vec<ThreadSnapshot>> {
            anyhow::bail!("introspection unavailable")
        }
    }

    fn snapshot(name: &str, state: ThreadState, frames: &[&str]) -> ThreadSnapshot {
        ThreadSnapshot {
            tid: 1,
            name: name.to_string(),
            state,
            frames: frames.iter().map(|f| Frame::new("", *f)).collect(),
        }
    }

    fn sampler_with(threads: Vec<ThreadSnapshot>, sampling: bool) -> (Sampler, Arc<AggregateStore>) {
        let store = Arc::new(AggregateStore::new(100));
        let sampler = Sampler::new(
            Arc::new(FixedProvider { threads }),
            Arc::clone(&store),
            Arc::new(AtomicBool::new(sampling)),
            10,
            Arc::new(HealthMetrics::new().expect("metrics build")),
        );
        (sampler, store)
    }

    #[test]
    fn test_keep_thread_states() {
        let keep = |state| keep_thread(&snapshot("worker", state, &["leaf", "root"]));
        assert!(keep(ThreadState::Running));
        assert!(keep(ThreadState::BlockedOnLock));
        assert!(!keep(ThreadState::Waiting));
        assert!(!keep(ThreadState::TimedWaiting));
        assert!(!keep(ThreadState::New));
        assert!(!keep(ThreadState::Terminated));
        assert!(!keep(ThreadState::Unknown));
    }

    #[test]
    fn test_keep_thread_excludes_sampler_itself() {
        let own = snapshot(SAMPLER_THREAD_NAME, ThreadState::Running, &["leaf"]);
        assert!(!keep_thread(&own));
    }

    #[test]
    fn test_keep_thread_excludes_empty_frames() {
        let empty = snapshot("worker", ThreadState::Running, &[]);
        assert!(!keep_thread(&empty));
    }

    #[test]
    fn test_tick_gated_off_records_nothing() {
        let threads = vec![snapshot("worker", ThreadState::Running, &["leaf", "root"])];
        let (sampler, store) = sampler_with(threads, false);

        for _ in 0..5 {
            assert!(!sampler.tick().expect("tick"));
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_tick_records_one_count_per_cycle() {
        let threads = vec![snapshot("worker", ThreadState::Running, &["leaf", "root"])];
        let (sampler, store) = sampler_with(threads, true);

        for _ in 0..3 {
            assert!(sampler.tick().expect("tick"));
        }

        let dump = store.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0], ("root;leaf".to_string(), 3));
    }

    #[test]
    fn test_tick_mixed_threads_filters_idle() {
        let threads = vec![
            snapshot("busy", ThreadState::Running, &["work", "main"]),
            snapshot("parked", ThreadState::Waiting, &["park", "main"]),
            snapshot("sleeping", ThreadState::TimedWaiting, &["sleep", "main"]),
        ];
        let (sampler, store) = sampler_with(threads, true);

        sampler.tick().expect("tick");

        let dump = store.dump();
        assert_eq!(dump.len(), 1);
        assert_eq!(dump[0].0, "main;work");
    }

    #[test]
    fn test_tick_propagates_snapshot_error() {
        let store = Arc::new(AggregateStore::new(10));
        let sampler = Sampler::new(
            Arc::new(FailingProvider),
            Arc::clone(&store),
            Arc::new(AtomicBool::new(true)),
            10,
            Arc::new(HealthMetrics::new().expect("metrics build")),
        );

        assert!(sampler.tick().is_err());
        assert!(store.is_empty());
    }
}
