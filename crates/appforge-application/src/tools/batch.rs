//! `batch`: concurrent fan-out of independent tool calls.

use std::sync::Weak;

use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::context::ToolContext;
use super::registry::ToolRegistry;
use super::tool::{Tool, parse_params};

/// Calls beyond this are discarded and counted as failed.
pub const MAX_BATCH_CALLS: usize = 25;

/// Tools that may not run inside a batch.
const NOT_BATCHABLE: [&str; 2] = ["batch", "task"];

#[derive(Debug, Deserialize)]
struct BatchParams {
    tool_calls: Vec<Map<String, Value>>,
}

/// Splits one entry into `(tool, arguments)`.
///
/// Arguments may sit under `parameters`, `args` or `arguments` (object or JSON
/// string), or inline next to `tool`.
fn split_call(mut entry: Map<String, Value>) -> std::result::Result<(String, Value), String> {
    let tool = match entry.remove("tool").or_else(|| entry.remove("name")) {
        Some(Value::String(name)) if !name.is_empty() => name,
        _ => return Err("missing tool name".to_string()),
    };
    for key in ["parameters", "args", "arguments"] {
        if let Some(value) = entry.remove(key) {
            return match value {
                Value::Object(_) => Ok((tool, value)),
                Value::String(raw) => serde_json::from_str::<Value>(&raw)
                    .ok()
                    .filter(Value::is_object)
                    .map(|v| (tool.clone(), v))
                    .ok_or_else(|| format!("arguments of {tool} are not a JSON object")),
                Value::Null => Ok((tool, json!({}))),
                _ => Err(format!("arguments of {tool} must be an object")),
            };
        }
    }
    Ok((tool, Value::Object(entry)))
}

fn call_report(index: usize, tool: &str, result: &ToolResult) -> Value {
    json!({
        "index": index,
        "tool": tool,
        "success": result.success,
        "output": result.output,
        "error": result.error,
        "data": result.data,
    })
}

pub struct BatchTool {
    registry: Weak<ToolRegistry>,
}

impl BatchTool {
    pub fn new(registry: Weak<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for BatchTool {
    fn name(&self) -> &str {
        "batch"
    }

    fn description(&self) -> &str {
        "Run up to 25 independent tool calls concurrently. Each entry is {tool, parameters}. \
         batch and task cannot be nested. Results are reported in input order."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_calls": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "tool": {"type": "string"},
                            "parameters": {"type": "object"}
                        },
                        "required": ["tool"]
                    }
                }
            },
            "required": ["tool_calls"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Cheap
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: BatchParams = parse_params(params)?;
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| ForgeError::internal("tool registry dropped"))?;

        let requested = p.tool_calls.len();
        let discarded = requested.saturating_sub(MAX_BATCH_CALLS);
        let child = ctx.for_batch();

        let calls = p.tool_calls.into_iter().take(MAX_BATCH_CALLS).enumerate().map(|(index, entry)| {
            let registry = &registry;
            let child = &child;
            async move {
                match split_call(entry) {
                    Err(message) => (
                        index,
                        String::new(),
                        ToolResult::failure(ToolErrorKind::InvalidParameters, message),
                    ),
                    Ok((tool, _)) if NOT_BATCHABLE.contains(&tool.as_str()) => {
                        let result = ToolResult::failure(
                            ToolErrorKind::InvalidParameters,
                            format!("{tool} cannot be called inside batch"),
                        );
                        (index, tool, result)
                    }
                    Ok((tool, args)) => {
                        let result = registry.execute(child, &tool, args).await;
                        (index, tool, result)
                    }
                }
            }
        });
        let results = join_all(calls).await;

        let succeeded = results.iter().filter(|(_, _, r)| r.success).count();
        let failed = requested - succeeded;
        let mut output = format!("Batch: {succeeded}/{requested} successful");
        if discarded > 0 {
            output.push_str(&format!(
                " ({discarded} call(s) over the limit of {MAX_BATCH_CALLS} discarded)"
            ));
        }
        for (index, tool, result) in &results {
            let label = if tool.is_empty() { "?" } else { tool.as_str() };
            let line = if result.success {
                format!("\n[{index}] {label}: ok")
            } else {
                format!("\n[{index}] {label}: {}", result.observation())
            };
            output.push_str(&line);
        }
        debug!(requested, succeeded, discarded, "[Tool:batch] Batch finished");

        let data = json!({
            "total": requested,
            "executed": results.len(),
            "succeeded": succeeded,
            "failed": failed,
            "discarded": discarded,
            "results": results
                .iter()
                .map(|(index, tool, result)| call_report(*index, tool, result))
                .collect::<Vec<_>>(),
        });
        // Per-call failures live in `results`; the batch itself ran.
        Ok(ToolResult::ok_with_data(output, data))
    }
}
