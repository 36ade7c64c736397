//! The tool contract.

use std::time::Duration;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolResult, ToolSchema};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::ToolContext;

/// What a tool's side effects touch, reported with its result so clients know
/// what to refresh.
pub mod resource {
    pub const DATABASE: &str = "database";
    pub const UI_SCHEMA: &str = "ui_schema";
    pub const LOGIC: &str = "logic";
    pub const PERSONA: &str = "persona";
    pub const WORKSPACE: &str = "workspace";
    pub const PLAN: &str = "plan";
}

/// A callable capability declared with a JSON-schema parameter contract.
///
/// `execute` returns `Err` only for failures the tool did not turn into a
/// result itself; the registry converts those into `success: false`.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Irreversible tools ask the engine for user approval first.
    fn requires_confirmation(&self) -> bool {
        false
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Cheap
    }

    fn affected_resource(&self) -> Option<&'static str> {
        None
    }

    /// Overrides the registry's per-call timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult>;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Deserializes tool arguments into a typed struct.
///
/// # Errors
///
/// Returns `ForgeError::Serialization`, which the registry reports as
/// `invalid parameters`.
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    Ok(serde_json::from_value(params)?)
}
