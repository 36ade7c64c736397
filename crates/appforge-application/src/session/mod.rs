//! Session management module.
//!
//! - `model`: the lock-guarded `Session` (phase, plan, history, busy flag)
//! - `compaction`: folding of old history into a `HistoryDigest`
//! - `manager`: `SessionManager`, the resident session map and idle reaper

mod compaction;
mod manager;
mod model;

pub use compaction::{Compaction, HistoryDigest, ToolTally};
pub use manager::SessionManager;
pub use model::{
    CancelOutcome, PendingAction, PhaseTransition, Session, SessionSummary, StepUpdate, TurnGuard,
};
