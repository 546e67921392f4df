//! Scheduled quota rollup.
//!
//! Each tick snapshots the live session store, groups by
//! (user, browser, version) and folds the group sizes into per-group
//! raw/avg/max statistics. Ticks never overlap: if a tick is still in
//! flight when the next is due, the new one is skipped outright rather
//! than queued.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::MetricsRecorder;
use crate::session::{BrowserKey, QuotaState, QuotaStateStore, SessionStateStore};

/// Downstream consumer of freshly computed quota statistics. Publication is
/// fire-and-forget from the rollup's perspective: a failing sink is logged
/// and the tick carries on.
pub trait QuotaSink: Send + Sync {
    fn publish(&self, key: &BrowserKey, state: &QuotaState) -> Result<()>;
}

/// Sink that surfaces quota statistics as prometheus gauges.
pub struct PrometheusSink {
    metrics: MetricsRecorder,
}

impl PrometheusSink {
    pub fn new(metrics: MetricsRecorder) -> Self {
        Self { metrics }
    }
}

impl QuotaSink for PrometheusSink {
    fn publish(&self, key: &BrowserKey, state: &QuotaState) -> Result<()> {
        self.metrics.update_quota(key, state);
        Ok(())
    }
}

/// Accumulated observation history for one quota group.
///
/// Averaging policy: a raw value is recorded as a sample only when it
/// differs from the previously recorded sample, and `avg` is the integer
/// mean (truncated toward zero) of recorded samples. Repeating a tick over
/// an unchanged session set therefore changes nothing, while `max` tracks
/// every observed raw.
#[derive(Debug, Default)]
struct QuotaHistory {
    sum: u64,
    samples: u64,
    last_raw: Option<u32>,
    max: u32,
}

impl QuotaHistory {
    fn observe(&mut self, raw: u32) -> QuotaState {
        if self.last_raw != Some(raw) {
            self.sum += raw as u64;
            self.samples += 1;
            self.last_raw = Some(raw);
        }
        if raw > self.max {
            self.max = raw;
        }
        QuotaState {
            raw,
            avg: (self.sum / self.samples) as u32,
            max: self.max,
        }
    }
}

pub struct QuotaRollupJob {
    store: Arc<SessionStateStore>,
    quotas: Arc<QuotaStateStore>,
    sink: Arc<dyn QuotaSink>,
    metrics: MetricsRecorder,
    history: Mutex<HashMap<BrowserKey, QuotaHistory>>,
    running: AtomicBool,
}

impl QuotaRollupJob {
    pub fn new(
        store: Arc<SessionStateStore>,
        quotas: Arc<QuotaStateStore>,
        sink: Arc<dyn QuotaSink>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            store,
            quotas,
            sink,
            metrics,
            history: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Runs one rollup tick. Returns false when the tick was skipped
    /// because a previous one is still in flight.
    pub fn run_once(&self) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Quota rollup tick skipped: previous tick still running");
            self.metrics.record_tick(true);
            return false;
        }
        // The flag must clear even if the tick unwinds, or every later tick
        // would be skipped as "still running".
        let _guard = RunningGuard(&self.running);
        self.tick();
        self.metrics.record_tick(false);
        true
    }

    fn tick(&self) {
        let mut counts: HashMap<BrowserKey, u32> = HashMap::new();
        for state in self.store.snapshot() {
            *counts.entry(state.browser_key()).or_insert(0) += 1;
        }
        debug!("Quota rollup over {} group(s)", counts.len());

        let mut history = self.history.lock();
        for (key, raw) in counts {
            let quota = history.entry(key.clone()).or_default().observe(raw);
            self.quotas.upsert(key.clone(), quota);
            // The sink is an arbitrary collaborator; neither an error nor a
            // panic from it may take down the tick or the schedule.
            let published = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.sink.publish(&key, &quota)
            }));
            match published {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Failed to publish quota stats for {}: {}", key, e),
                Err(_) => warn!("Quota sink panicked publishing stats for {}", key),
            }
        }
    }

    /// Spawns the periodic schedule on the tokio runtime. Missed ticks are
    /// skipped, never bunched.
    pub fn schedule(self: Arc<Self>, every: Duration) -> RollupScheduler {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; swallow it so the
            // first rollup happens one full period after startup.
            interval.tick().await;
            loop {
                interval.tick().await;
                self.run_once();
            }
        });
        RollupScheduler { handle }
    }
}

// Clears the in-flight flag on every exit path, including unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to the scheduled rollup task.
pub struct RollupScheduler {
    handle: JoinHandle<()>,
}

impl RollupScheduler {
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for RollupScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
