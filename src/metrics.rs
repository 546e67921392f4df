use crate::error::{Error, Result};
use crate::session::{BrowserKey, QuotaState};
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Encoder, Gauge,
    GaugeVec, TextEncoder,
};

lazy_static::lazy_static! {
    // Session lifecycle events, labeled by event kind / outcome
    static ref SESSION_EVENTS: CounterVec = register_counter_vec!(
        "grid_quota_session_events_total",
        "Session lifecycle events processed by the aggregation engine",
        &["event"]
    ).unwrap();

    // Live session gauge
    static ref ACTIVE_SESSIONS: Gauge = register_gauge!(
        "grid_quota_active_sessions",
        "Number of live sessions currently tracked"
    ).unwrap();

    // Rollup tick outcomes
    static ref ROLLUP_TICKS: CounterVec = register_counter_vec!(
        "grid_quota_rollup_ticks_total",
        "Quota rollup ticks by outcome",
        &["status"]
    ).unwrap();

    // Quota statistics per group
    static ref QUOTA_STATS: GaugeVec = register_gauge_vec!(
        "grid_quota_stats",
        "Per-user quota statistics by browser and version",
        &["user", "browser", "version", "stat"]
    ).unwrap();
}

pub struct MetricsRecorder {
    enabled: bool,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    pub fn with_enabled(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn record_event(&self, event: &str) {
        if self.enabled {
            SESSION_EVENTS.with_label_values(&[event]).inc();
        }
    }

    pub fn set_active_sessions(&self, count: usize) {
        if self.enabled {
            ACTIVE_SESSIONS.set(count as f64);
        }
    }

    pub fn record_tick(&self, skipped: bool) {
        if self.enabled {
            let status = if skipped { "skipped" } else { "run" };
            ROLLUP_TICKS.with_label_values(&[status]).inc();
        }
    }

    pub fn update_quota(&self, key: &BrowserKey, state: &QuotaState) {
        if self.enabled {
            for (stat, value) in [("raw", state.raw), ("avg", state.avg), ("max", state.max)] {
                QUOTA_STATS
                    .with_label_values(&[&key.user, &key.browser, &key.version, stat])
                    .set(value as f64);
            }
        }
    }

    // Export metrics in Prometheus text format
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = prometheus::gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| Error::Metrics(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| Error::Metrics(format!("Failed to convert metrics to string: {}", e)))
    }
}
