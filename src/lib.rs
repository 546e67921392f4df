//! Session lifecycle tracking and per-user quota aggregation for a browser
//! grid dispatcher.
//!
//! Lifecycle events (start/update/delete) are serialized per session id
//! through a small state machine into a concurrent keyed store; a scheduled
//! rollup folds the live session set into per-(user, browser, version)
//! raw/avg/max quota statistics and publishes them to a pluggable sink.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod rollup;
pub mod session;

use std::sync::Arc;
use std::time::Duration;

pub use config::QuotaConfig;
pub use engine::{SessionCatalog, SessionsAggregator, StoreCatalog};
pub use error::{Error, Result};
pub use metrics::MetricsRecorder;
pub use rollup::{PrometheusSink, QuotaRollupJob, QuotaSink, RollupScheduler};
pub use session::{
    BrowserKey, QuotaState, QuotaStateStore, SessionEvent, SessionEventKind, SessionState,
    SessionStateStore,
};

/// Wires the engine, the stores and the rollup job together and owns the
/// rollup schedule.
pub struct GridQuota {
    config: QuotaConfig,
    sessions: Arc<SessionsAggregator>,
    rollup: Arc<QuotaRollupJob>,
    scheduler: parking_lot::Mutex<Option<RollupScheduler>>,
}

impl GridQuota {
    /// Builds a self-contained instance: store-backed catalog, prometheus
    /// sink.
    pub fn new(config: QuotaConfig) -> Result<Self> {
        let store = Arc::new(SessionStateStore::new());
        let catalog = Arc::new(StoreCatalog::new(store.clone()));
        let sink = Arc::new(PrometheusSink::new(MetricsRecorder::with_enabled(
            config.metrics_enabled,
        )));
        Self::with_collaborators(config, store, catalog, sink)
    }

    /// Builds an instance around externally owned collaborators.
    pub fn with_collaborators(
        config: QuotaConfig,
        store: Arc<SessionStateStore>,
        catalog: Arc<dyn SessionCatalog>,
        sink: Arc<dyn QuotaSink>,
    ) -> Result<Self> {
        config.validate()?;
        let quotas = Arc::new(QuotaStateStore::new());
        let sessions = Arc::new(SessionsAggregator::new(
            store.clone(),
            quotas.clone(),
            catalog,
            MetricsRecorder::with_enabled(config.metrics_enabled),
        ));
        let rollup = Arc::new(QuotaRollupJob::new(
            store,
            quotas,
            sink,
            MetricsRecorder::with_enabled(config.metrics_enabled),
        ));
        Ok(Self {
            config,
            sessions,
            rollup,
            scheduler: parking_lot::Mutex::new(None),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionsAggregator> {
        &self.sessions
    }

    pub fn rollup(&self) -> &Arc<QuotaRollupJob> {
        &self.rollup
    }

    /// Starts the periodic rollup on the current tokio runtime. Replaces any
    /// previously started schedule.
    pub fn start_rollup(&self) {
        let scheduler = self.rollup.clone().schedule(self.config.rollup_interval);
        *self.scheduler.lock() = Some(scheduler);
    }

    pub fn stop_rollup(&self) {
        if let Some(scheduler) = self.scheduler.lock().take() {
            scheduler.stop();
        }
    }

    /// Expires sessions older than the configured TTL.
    pub fn expire_stale_sessions(&self) {
        self.sessions
            .expire_sessions_older_than(self.config.session_ttl);
    }

    /// Expires sessions older than an explicit threshold.
    pub fn expire_sessions_older_than(&self, duration: Duration) {
        self.sessions.expire_sessions_older_than(duration);
    }
}
