use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the unix epoch. Event timestamps are always
/// stamped by the engine at admission, never supplied by callers.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEventKind {
    Start,
    Update,
    Delete,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::Start => "start",
            SessionEventKind::Update => "update",
            SessionEventKind::Delete => "delete",
        }
    }
}

/// A lifecycle event for one session, routed through the per-key state
/// machine. The route string is opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: String,
    pub user: String,
    pub browser: String,
    pub version: String,
    pub route: String,
    pub timestamp: u64,
}

/// The materialized live view of one session, owned by the session store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub user: String,
    pub browser: String,
    pub version: String,
    pub route: String,
    pub timestamp: u64,
}

impl SessionState {
    pub fn browser_key(&self) -> BrowserKey {
        BrowserKey {
            user: self.user.clone(),
            browser: self.browser.clone(),
            version: self.version.clone(),
        }
    }

    /// Synthesizes a follow-up event carrying this state's identity with a
    /// fresh admission timestamp.
    pub fn to_event(&self, kind: SessionEventKind) -> SessionEvent {
        SessionEvent {
            kind,
            session_id: self.session_id.clone(),
            user: self.user.clone(),
            browser: self.browser.clone(),
            version: self.version.clone(),
            route: self.route.clone(),
            timestamp: now_millis(),
        }
    }
}

/// Grouping key for quota accounting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BrowserKey {
    pub user: String,
    pub browser: String,
    pub version: String,
}

impl BrowserKey {
    pub fn new(user: impl Into<String>, browser: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            browser: browser.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for BrowserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.browser, self.version)
    }
}

/// Latest quota statistics for one (user, browser, version) group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    /// Live session count at the last rollup tick.
    pub raw: u32,
    /// Truncated integer mean over the group's recorded history.
    pub avg: u32,
    /// High-water mark of raw across all ticks observed for the group.
    pub max: u32,
}
