//! Concurrency-safe stores for live session state and quota statistics.
//!
//! Both stores sit on DashMap: writers for distinct keys proceed in
//! parallel, while the entry API gives each key an atomic
//! read-modify-write. Snapshots clone entries shard by shard
//! (copy-then-release) and never hold a lock across the whole map.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;

use super::types::{BrowserKey, QuotaState, SessionState};

/// Keyed store of live session state. Exclusively owns all `SessionState`
/// instances; a key is present exactly while its session is alive.
#[derive(Debug, Default)]
pub struct SessionStateStore {
    map: DashMap<String, SessionState>,
}

impl SessionStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<SessionState> {
        self.map.get(session_id).map(|entry| entry.value().clone())
    }

    pub fn delete(&self, session_id: &str) -> Option<SessionState> {
        self.map.remove(session_id).map(|(_, state)| state)
    }

    /// Atomic per-key read-modify-write. `f` sees the current state (if any)
    /// and returns the state to store, or `None` to remove the key. No other
    /// writer can interleave on the same key while `f` runs.
    pub fn upsert<F>(&self, session_id: &str, f: F)
    where
        F: FnOnce(Option<&SessionState>) -> Option<SessionState>,
    {
        match self.map.entry(session_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                let next = f(Some(occupied.get()));
                match next {
                    Some(state) => {
                        occupied.insert(state);
                    }
                    None => {
                        occupied.remove();
                    }
                }
            }
            Entry::Vacant(vacant) => {
                if let Some(state) = f(None) {
                    vacant.insert(state);
                }
            }
        }
    }

    /// Point-in-time copy of all live states.
    pub fn snapshot(&self) -> Vec<SessionState> {
        self.map.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Latest quota statistics per (user, browser, version). Written only by the
/// rollup job; keys persist once first observed.
#[derive(Debug, Default)]
pub struct QuotaStateStore {
    map: DashMap<BrowserKey, QuotaState>,
}

impl QuotaStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &BrowserKey) -> Option<QuotaState> {
        self.map.get(key).map(|entry| *entry.value())
    }

    pub fn upsert(&self, key: BrowserKey, state: QuotaState) {
        self.map.insert(key, state);
    }

    pub fn snapshot(&self) -> HashMap<BrowserKey, QuotaState> {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
