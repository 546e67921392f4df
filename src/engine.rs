//! The session aggregation engine: the caller-facing surface that routes
//! lifecycle events through the per-key state machine into the session
//! store. No operation here returns an error; malformed events are absorbed
//! by the FSM's stop condition and lookups that miss are benign no-ops.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::metrics::MetricsRecorder;
use crate::naming;
use crate::session::{
    fsm, now_millis, BrowserKey, QuotaState, QuotaStateStore, SessionEvent, SessionEventKind,
    SessionState, SessionStateStore, Transition,
};

/// Read-only view of the external session catalog. Count semantics are
/// owned by the collaborator; the engine only guarantees these calls are
/// side-effect free.
pub trait SessionCatalog: Send + Sync {
    fn find_session_by_id(&self, session_id: &str) -> Option<SessionState>;
    fn count_sessions_by_user(&self, user: &str) -> u64;
    fn count_sessions_by_user_and_browser(&self, user: &str, browser: &str, version: &str) -> u64;
    fn sessions_by_user_count(&self) -> HashMap<BrowserKey, u64>;
}

/// Catalog backed by the live session store itself, for in-process
/// deployments where no external catalog service exists.
pub struct StoreCatalog {
    store: Arc<SessionStateStore>,
}

impl StoreCatalog {
    pub fn new(store: Arc<SessionStateStore>) -> Self {
        Self { store }
    }
}

impl SessionCatalog for StoreCatalog {
    fn find_session_by_id(&self, session_id: &str) -> Option<SessionState> {
        self.store.get(session_id)
    }

    fn count_sessions_by_user(&self, user: &str) -> u64 {
        self.store
            .snapshot()
            .iter()
            .filter(|state| state.user == user)
            .count() as u64
    }

    fn count_sessions_by_user_and_browser(&self, user: &str, browser: &str, version: &str) -> u64 {
        self.store
            .snapshot()
            .iter()
            .filter(|state| {
                state.user == user && state.browser == browser && state.version == version
            })
            .count() as u64
    }

    fn sessions_by_user_count(&self) -> HashMap<BrowserKey, u64> {
        let mut counts = HashMap::new();
        for state in self.store.snapshot() {
            *counts.entry(state.browser_key()).or_insert(0) += 1;
        }
        counts
    }
}

pub struct SessionsAggregator {
    store: Arc<SessionStateStore>,
    quotas: Arc<QuotaStateStore>,
    catalog: Arc<dyn SessionCatalog>,
    metrics: MetricsRecorder,
}

impl SessionsAggregator {
    pub fn new(
        store: Arc<SessionStateStore>,
        quotas: Arc<QuotaStateStore>,
        catalog: Arc<dyn SessionCatalog>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            store,
            quotas,
            catalog,
            metrics,
        }
    }

    /// Admits a new session. Browser name and version are canonicalized
    /// before storage. A duplicate start for an existing id overwrites the
    /// previous state (last-write-wins, tolerating at-least-once delivery).
    pub fn start_session(
        &self,
        session_id: &str,
        user: &str,
        browser: &str,
        version: &str,
        route: &str,
    ) {
        let name = naming::browser_name(browser);
        let ver = naming::browser_version(version);
        info!("Starting session {} for {}:{}:{} ({})", session_id, user, name, ver, route);
        let event = SessionEvent {
            kind: SessionEventKind::Start,
            session_id: session_id.to_string(),
            user: user.to_string(),
            browser: name,
            version: ver,
            route: route.to_string(),
            timestamp: now_millis(),
        };
        self.route_event(event);
    }

    /// Removes a session. Unknown ids are a silent no-op, tolerating
    /// duplicate or late delete delivery.
    pub fn delete_session(&self, session_id: &str) {
        info!("Removing session {}", session_id);
        if let Some(state) = self.store.get(session_id) {
            self.route_event(state.to_event(SessionEventKind::Delete));
        }
    }

    /// Refreshes a session's admission timestamp. Unknown ids are a silent
    /// no-op.
    pub fn update_session(&self, session_id: &str) {
        info!("Updating session {}", session_id);
        if let Some(state) = self.store.get(session_id) {
            self.route_event(state.to_event(SessionEventKind::Update));
        }
    }

    /// Deletes every session whose last event is at least `duration` old.
    /// Operates on a snapshot, so sessions refreshed concurrently with the
    /// scan survive it; re-invoking immediately removes nothing further.
    pub fn expire_sessions_older_than(&self, duration: Duration) {
        let now = now_millis();
        let threshold = duration.as_millis() as u64;
        let mut expired = 0usize;
        for state in self.store.snapshot() {
            if now.saturating_sub(state.timestamp) >= threshold {
                debug!("Expiring session {} (age >= {:?})", state.session_id, duration);
                self.route_event(state.to_event(SessionEventKind::Delete));
                self.metrics.record_event("expired");
                expired += 1;
            }
        }
        if expired > 0 {
            info!("Expired {} stale sessions", expired);
        }
    }

    pub fn active_sessions(&self) -> HashSet<String> {
        self.store
            .snapshot()
            .into_iter()
            .map(|state| state.session_id)
            .collect()
    }

    pub fn sessions_by_user(&self, user: &str) -> Vec<SessionState> {
        self.store
            .snapshot()
            .into_iter()
            .filter(|state| state.user == user)
            .collect()
    }

    pub fn sessions_count_for_user(&self, user: &str) -> u64 {
        self.catalog.count_sessions_by_user(user)
    }

    pub fn sessions_count_for_user_and_browser(
        &self,
        user: &str,
        browser: &str,
        version: &str,
    ) -> u64 {
        self.catalog
            .count_sessions_by_user_and_browser(user, browser, version)
    }

    /// Latest quota statistics. Note: the returned map covers every group
    /// ever observed, not just `user`'s; filtering is left to the caller.
    /// This mirrors the upstream contract, quirk included.
    pub fn stats_for(&self, _user: &str) -> HashMap<BrowserKey, QuotaState> {
        self.stats()
    }

    pub fn stats(&self) -> HashMap<BrowserKey, QuotaState> {
        self.quotas.snapshot()
    }

    fn route_event(&self, event: SessionEvent) {
        debug!(
            "on {} session {} for {}:{}:{} ({})",
            event.kind.as_str(),
            event.session_id,
            event.user,
            event.browser,
            event.version,
            event.route
        );
        let mut stored = false;
        self.store.upsert(&event.session_id, |current| {
            match fsm::apply(current, &event) {
                Transition::Store(state) => {
                    stored = true;
                    Some(state)
                }
                Transition::Remove => None,
            }
        });
        if stored || event.kind == SessionEventKind::Delete {
            self.metrics.record_event(event.kind.as_str());
        } else {
            self.metrics.record_event("rejected");
        }
        self.metrics.set_active_sessions(self.store.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SessionsAggregator {
        let store = Arc::new(SessionStateStore::new());
        let quotas = Arc::new(QuotaStateStore::new());
        let catalog = Arc::new(StoreCatalog::new(store.clone()));
        SessionsAggregator::new(store, quotas, catalog, MetricsRecorder::with_enabled(false))
    }

    #[test]
    fn lifecycle_start_update_delete() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "firefox", "33.0", "http://host:4444");
        assert!(sessions.active_sessions().contains("s1"));

        sessions.update_session("s1");
        assert!(sessions.active_sessions().contains("s1"));

        sessions.delete_session("s1");
        assert!(sessions.active_sessions().is_empty());
    }

    #[test]
    fn delete_of_unknown_session_is_noop() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "firefox", "33.0", "");
        sessions.delete_session("missing");
        assert_eq!(sessions.active_sessions().len(), 1);
    }

    #[test]
    fn update_of_unknown_session_is_noop() {
        let sessions = engine();
        sessions.update_session("missing");
        assert!(sessions.active_sessions().is_empty());
    }

    #[test]
    fn empty_browser_or_version_never_materializes() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "", "33.0", "");
        sessions.start_session("s2", "vasya", "firefox", "", "");
        assert!(sessions.active_sessions().is_empty());
    }

    #[test]
    fn duplicate_start_overwrites_by_id() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "firefox", "33.0", "");
        sessions.start_session("s1", "vasya", "chrome", "50", "");
        assert_eq!(sessions.active_sessions().len(), 1);
        let states = sessions.sessions_by_user("vasya");
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].browser, "chrome");
        assert_eq!(states[0].version, "50.0");
    }

    #[test]
    fn browser_identifiers_are_canonicalized() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", " Firefox ", "33", "");
        let states = sessions.sessions_by_user("vasya");
        assert_eq!(states[0].browser, "firefox");
        assert_eq!(states[0].version, "33.0");
    }

    #[test]
    fn counts_delegate_to_catalog() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "firefox", "33.0", "");
        sessions.start_session("s2", "vasya", "firefox", "33.0", "");
        sessions.start_session("s3", "vasya", "chrome", "50.0", "");
        sessions.start_session("s4", "petya", "firefox", "33.0", "");

        assert_eq!(sessions.sessions_count_for_user("vasya"), 3);
        assert_eq!(
            sessions.sessions_count_for_user_and_browser("vasya", "firefox", "33.0"),
            2
        );
        assert_eq!(sessions.sessions_count_for_user("nobody"), 0);
    }

    #[test]
    fn catalog_grouped_counts_cover_all_live_sessions() {
        let store = Arc::new(SessionStateStore::new());
        let quotas = Arc::new(QuotaStateStore::new());
        let catalog = Arc::new(StoreCatalog::new(store.clone()));
        let sessions = SessionsAggregator::new(
            store,
            quotas,
            catalog.clone(),
            MetricsRecorder::with_enabled(false),
        );
        sessions.start_session("s1", "vasya", "firefox", "33.0", "");
        sessions.start_session("s2", "vasya", "firefox", "33.0", "");
        sessions.start_session("s3", "vasya", "chrome", "50.0", "");
        sessions.start_session("s4", "petya", "firefox", "33.0", "");

        let counts = catalog.sessions_by_user_count();
        assert_eq!(counts.len(), 3);
        assert_eq!(counts.get(&BrowserKey::new("vasya", "firefox", "33.0")), Some(&2));
        assert_eq!(counts.get(&BrowserKey::new("vasya", "chrome", "50.0")), Some(&1));
        assert_eq!(counts.get(&BrowserKey::new("petya", "firefox", "33.0")), Some(&1));

        sessions.delete_session("s1");
        let counts = catalog.sessions_by_user_count();
        assert_eq!(counts.get(&BrowserKey::new("vasya", "firefox", "33.0")), Some(&1));
    }

    #[test]
    fn expiry_removes_exactly_the_aged_sessions() {
        let sessions = engine();
        sessions.start_session("s1", "vasya", "firefox", "33.0", "");
        sessions.start_session("s2", "vasya", "firefox", "33.0", "");

        // Nothing is a day old yet.
        sessions.expire_sessions_older_than(Duration::from_secs(86_400));
        assert_eq!(sessions.active_sessions().len(), 2);

        // Everything is at least zero old.
        sessions.expire_sessions_older_than(Duration::ZERO);
        assert!(sessions.active_sessions().is_empty());

        // Idempotent re-invocation.
        sessions.expire_sessions_older_than(Duration::ZERO);
        assert!(sessions.active_sessions().is_empty());
    }
}
