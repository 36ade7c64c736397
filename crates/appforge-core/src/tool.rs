//! Tool contract types shared by the registry, the engine and the LLM adapter.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

/// Soft failure classes reported inside a `ToolResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ToolErrorKind {
    InvalidParameters,
    UnknownTool,
    PersonaDenied,
    SqlError,
    ValidationFailed,
    ExecutionFailed,
    Timeout,
    Cancelled,
}

/// Relative cost of a tool, shown to the model in the tool table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolCost {
    Free,
    Cheap,
    Moderate,
}

/// Outcome of one tool execution.
///
/// Tools never fail the turn: every error becomes `success: false` and is fed back
/// to the model as an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            error_kind: None,
            data: None,
        }
    }

    pub fn ok_with_data(output: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(output)
        }
    }

    pub fn failure(kind: ToolErrorKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            error_kind: Some(kind),
            data: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Text fed back to the model for this result.
    pub fn observation(&self) -> String {
        if self.success {
            return self.output.clone();
        }
        let error = self.error.as_deref().unwrap_or("unknown error");
        if self.output.is_empty() {
            format!("Error: {error}")
        } else {
            format!("Error: {error}\n{}", self.output)
        }
    }
}

/// A tool as advertised to the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_prefixes_errors() {
        let result = ToolResult::failure(ToolErrorKind::SqlError, "no such table: x");
        assert_eq!(result.observation(), "Error: no such table: x");
        assert_eq!(ToolResult::ok("done").observation(), "done");
    }

    #[test]
    fn test_cost_labels() {
        assert_eq!(ToolCost::Free.to_string(), "FREE");
        assert_eq!(ToolCost::Moderate.to_string(), "MODERATE");
    }
}
