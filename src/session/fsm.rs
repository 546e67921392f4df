//! Per-session state machine.
//!
//! A single merge-then-validate step unifies create and update: the incoming
//! event is merged onto the current state (or a fresh state when none
//! exists) and the result is gated by the stop condition before it may be
//! stored. The stop condition forces removal instead of persistence for
//! malformed or out-of-order event sequences, so a partially populated
//! session can never leak into the store.

use super::types::{SessionEvent, SessionEventKind, SessionState};

/// Outcome of applying one event to one session key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Persist the candidate state for this key.
    Store(SessionState),
    /// Remove the key from the store (terminal).
    Remove,
}

/// Applies `event` to the current state of its session key.
pub fn apply(current: Option<&SessionState>, event: &SessionEvent) -> Transition {
    let candidate = merge(current, event);

    // Delete is terminal no matter what the candidate looks like.
    if event.kind == SessionEventKind::Delete {
        return Transition::Remove;
    }

    // Stop condition: an update with no started lineage, or a candidate with
    // any required field missing, must not be persisted.
    let started = event.kind == SessionEventKind::Start || current.is_some();
    if !started || !is_complete(&candidate) {
        return Transition::Remove;
    }

    Transition::Store(candidate)
}

/// Builds the candidate next state: non-empty event fields overwrite the
/// current ones, and the admission timestamp always advances to the event's.
fn merge(current: Option<&SessionState>, event: &SessionEvent) -> SessionState {
    let mut state = current.cloned().unwrap_or_else(|| SessionState {
        session_id: String::new(),
        user: String::new(),
        browser: String::new(),
        version: String::new(),
        route: String::new(),
        timestamp: 0,
    });
    overwrite(&mut state.session_id, &event.session_id);
    overwrite(&mut state.user, &event.user);
    overwrite(&mut state.browser, &event.browser);
    overwrite(&mut state.version, &event.version);
    overwrite(&mut state.route, &event.route);
    state.timestamp = event.timestamp;
    state
}

fn overwrite(field: &mut String, value: &str) {
    if !value.is_empty() {
        *field = value.to_string();
    }
}

fn is_complete(state: &SessionState) -> bool {
    !state.session_id.is_empty()
        && !state.user.is_empty()
        && !state.browser.is_empty()
        && !state.version.is_empty()
}
