#![allow(dead_code)]

use grid_quota::{
    BrowserKey, MetricsRecorder, QuotaRollupJob, QuotaSink, QuotaState, QuotaStateStore,
    Result, SessionStateStore, SessionsAggregator, StoreCatalog,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;

/// Sink that records every published quota state, for assertions.
#[derive(Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(BrowserKey, QuotaState)>>,
}

impl RecordingSink {
    pub fn published(&self) -> Vec<(BrowserKey, QuotaState)> {
        self.published.lock().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().len()
    }
}

impl QuotaSink for RecordingSink {
    fn publish(&self, key: &BrowserKey, state: &QuotaState) -> Result<()> {
        self.published.lock().push((key.clone(), *state));
        Ok(())
    }
}

pub struct TestGrid {
    pub sessions: Arc<SessionsAggregator>,
    pub rollup: Arc<QuotaRollupJob>,
    pub sink: Arc<RecordingSink>,
}

impl TestGrid {
    pub fn new() -> Self {
        init_tracing();
        let store = Arc::new(SessionStateStore::new());
        let quotas = Arc::new(QuotaStateStore::new());
        let catalog = Arc::new(StoreCatalog::new(store.clone()));
        let sink = Arc::new(RecordingSink::default());
        let sessions = Arc::new(SessionsAggregator::new(
            store.clone(),
            quotas.clone(),
            catalog,
            MetricsRecorder::with_enabled(false),
        ));
        let rollup = Arc::new(QuotaRollupJob::new(
            store,
            quotas,
            sink.clone(),
            MetricsRecorder::with_enabled(false),
        ));
        Self {
            sessions,
            rollup,
            sink,
        }
    }

    pub fn start_session_for(&self, user: &str) -> String {
        let session_id = random_session_id();
        self.sessions
            .start_session(&session_id, user, "firefox", "33.0", "http://host:4444");
        session_id
    }

    pub fn stats_for(&self, user: &str) -> Option<QuotaState> {
        self.sessions
            .stats_for(user)
            .get(&BrowserKey::new(user, "firefox", "33.0"))
            .copied()
    }
}

pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn random_session_id() -> String {
    let mut rng = rand::rng();
    (0..16)
        .map(|_| rng.sample(rand::distr::Alphanumeric) as char)
        .collect()
}
