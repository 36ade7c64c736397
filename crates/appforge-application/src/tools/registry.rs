//! Tool catalog and dispatch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use appforge_core::ForgeError;
use appforge_core::tool::{ToolErrorKind, ToolResult, ToolSchema};
use futures::FutureExt;
use jsonschema::Validator;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::context::ToolContext;
use super::tool::Tool;

pub const UNKNOWN_TOOL: &str = "unknown tool";
pub const PERSONA_DENIED: &str = "tool not allowed by persona";

struct Entry {
    tool: Arc<dyn Tool>,
    validator: Option<Arc<Validator>>,
}

#[derive(Default)]
struct Catalog {
    /// Registration order, used for listings
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

/// Declarative catalog of callable tools.
///
/// `execute` never fails: unknown tools, persona denials, schema mismatches,
/// timeouts, cancellation and panics all come back as `success: false` results.
pub struct ToolRegistry {
    catalog: RwLock<Catalog>,
    default_timeout: Duration,
}

impl ToolRegistry {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            default_timeout,
        }
    }

    /// Registers a tool, replacing one with the same name.
    ///
    /// The parameter schema is compiled once here. A schema that does not compile
    /// is logged and the tool runs unvalidated.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        let validator = match jsonschema::validator_for(&tool.parameters()) {
            Ok(v) => Some(Arc::new(v)),
            Err(e) => {
                warn!(tool = %name, error = %e, "[ToolRegistry] Parameter schema does not compile");
                None
            }
        };
        let mut catalog = self.catalog.write().unwrap_or_else(PoisonError::into_inner);
        if !catalog.entries.contains_key(&name) {
            catalog.order.push(name.clone());
        }
        catalog.entries.insert(name, Entry { tool, validator });
    }

    fn lookup(&self, name: &str) -> Option<(Arc<dyn Tool>, Option<Arc<Validator>>)> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog
            .entries
            .get(name)
            .map(|e| (Arc::clone(&e.tool), e.validator.clone()))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.lookup(name).map(|(tool, _)| tool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .order
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All tools in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
        catalog
            .order
            .iter()
            .filter_map(|name| catalog.entries.get(name))
            .map(|e| Arc::clone(&e.tool))
            .collect()
    }

    /// Tools in the allow-list, in registration order. An empty list allows all.
    pub fn list_filtered(&self, allowlist: &[String]) -> Vec<Arc<dyn Tool>> {
        self.list()
            .into_iter()
            .filter(|t| allowlist.is_empty() || allowlist.iter().any(|a| a == t.name()))
            .collect()
    }

    pub fn schemas(&self, allowlist: &[String]) -> Vec<ToolSchema> {
        self.list_filtered(allowlist)
            .iter()
            .map(|t| t.schema())
            .collect()
    }

    /// Whether the named tool needs user approval before dispatch.
    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.requires_confirmation())
    }

    pub fn affected_resource(&self, name: &str) -> Option<&'static str> {
        self.get(name).and_then(|t| t.affected_resource())
    }

    /// Dispatches a call whose arguments are still the model's raw JSON text.
    pub async fn execute_raw(&self, ctx: &ToolContext, name: &str, arguments: &str) -> ToolResult {
        let params = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(value) => value,
                Err(e) if self.contains(name) => {
                    return ToolResult::failure(
                        ToolErrorKind::InvalidParameters,
                        format!("invalid parameters: {e}"),
                    );
                }
                Err(_) => return unknown_tool(name),
            }
        };
        self.execute(ctx, name, params).await
    }

    /// Looks up, authorises, validates and runs one tool call.
    pub async fn execute(&self, ctx: &ToolContext, name: &str, params: Value) -> ToolResult {
        let Some((tool, validator)) = self.lookup(name) else {
            return unknown_tool(name);
        };

        if let Some(persona) = &ctx.persona {
            if !persona.allows(name) {
                debug!(tool = name, persona_id = %persona.persona_id, "[ToolRegistry] Denied by persona");
                return ToolResult::failure(ToolErrorKind::PersonaDenied, PERSONA_DENIED).with_output(
                    format!(
                        "Tool '{name}' is not available to persona '{}'.",
                        persona.persona_id
                    ),
                );
            }
        }

        if let Some(validator) = validator {
            let problems: Vec<String> = validator
                .iter_errors(&params)
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            if !problems.is_empty() {
                return ToolResult::failure(
                    ToolErrorKind::InvalidParameters,
                    format!("invalid parameters: {}", problems.join("; ")),
                );
            }
        }

        if ctx.cancel.is_cancelled() {
            return ToolResult::failure(ToolErrorKind::Cancelled, "cancelled");
        }

        let limit = tool.timeout().unwrap_or(self.default_timeout);
        let call = AssertUnwindSafe(tool.execute(ctx, params)).catch_unwind();
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return ToolResult::failure(ToolErrorKind::Cancelled, "cancelled");
            }
            outcome = tokio::time::timeout(limit, call) => outcome,
        };

        match outcome {
            Err(_) => {
                warn!(tool = name, timeout_secs = limit.as_secs(), "[ToolRegistry] Tool timed out");
                ToolResult::failure(
                    ToolErrorKind::Timeout,
                    format!("tool timed out after {}s", limit.as_secs()),
                )
            }
            Ok(Err(panic)) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = name, panic = %message, "[ToolRegistry] Tool panicked");
                ToolResult::failure(ToolErrorKind::ExecutionFailed, "internal tool failure")
            }
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(err))) => {
                debug!(tool = name, error = %err, "[ToolRegistry] Tool returned an error");
                failure_from_error(err)
            }
        }
    }
}

fn unknown_tool(name: &str) -> ToolResult {
    ToolResult::failure(ToolErrorKind::UnknownTool, UNKNOWN_TOOL)
        .with_output(format!("No tool named '{name}' is registered."))
}

/// Converts an error a tool propagated into a soft failure.
pub fn failure_from_error(err: ForgeError) -> ToolResult {
    match err {
        ForgeError::Serialization { message, .. } => ToolResult::failure(
            ToolErrorKind::InvalidParameters,
            format!("invalid parameters: {message}"),
        ),
        ForgeError::InvalidSchema(message) => {
            ToolResult::failure(ToolErrorKind::InvalidParameters, message)
        }
        ForgeError::Sql(message) => ToolResult::failure(ToolErrorKind::SqlError, message),
        err @ ForgeError::ColumnExists { .. } => {
            ToolResult::failure(ToolErrorKind::SqlError, err.to_string())
        }
        err @ ForgeError::Timeout(_) => ToolResult::failure(ToolErrorKind::Timeout, err.to_string()),
        ForgeError::Cancelled => ToolResult::failure(ToolErrorKind::Cancelled, "cancelled"),
        err @ ForgeError::Internal(_) => {
            error!(error = %err, "[ToolRegistry] Internal error in tool");
            ToolResult::failure(ToolErrorKind::ExecutionFailed, "internal error")
        }
        other => ToolResult::failure(ToolErrorKind::ExecutionFailed, other.to_string()),
    }
}
