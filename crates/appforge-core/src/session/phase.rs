//! Session phase state machine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Where a session stands in the plan/execute lifecycle.
///
/// ```text
/// planning --create_plan--> (draft) --confirm--> confirmed
/// confirmed --first tool call--> executing
/// executing --all steps terminal--> completed
/// executing --unrecoverable error--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Planning,
    Confirmed,
    Executing,
    Completed,
    Failed,
}

impl SessionPhase {
    /// Phases in which a plan may be (re)set.
    pub fn accepts_plan(self) -> bool {
        matches!(self, SessionPhase::Planning | SessionPhase::Executing)
    }

    pub fn is_finished(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}
