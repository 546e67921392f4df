pub mod fsm;
pub mod store;
pub mod types;

pub use fsm::Transition;
pub use store::{QuotaStateStore, SessionStateStore};
pub use types::{now_millis, BrowserKey, QuotaState, SessionEvent, SessionEventKind, SessionState};
