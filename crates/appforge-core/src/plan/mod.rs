//! Plans proposed by the agent and confirmed by the user.

pub mod model;

pub use model::{Plan, PlanGroup, PlanProgress, PlanStatus, PlanStep, StepStatus};
