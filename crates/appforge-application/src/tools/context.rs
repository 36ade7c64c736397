//! Execution context handed to every tool call.

use std::sync::Arc;

use appforge_core::event::DoneReason;
use appforge_core::persona::Persona;
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::session::Session;

/// Identity of the turn a tool runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskContext {
    pub workspace_id: String,
    pub user_id: String,
}

/// Tool restriction of the calling persona.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonaContext {
    pub persona_id: String,
    /// Empty means every tool is permitted
    pub tool_filter: Vec<String>,
}

impl PersonaContext {
    pub fn from_persona(persona: &Persona) -> Self {
        Self {
            persona_id: persona.id.clone(),
            tool_filter: persona.tool_filter.clone(),
        }
    }

    pub fn allows(&self, tool_name: &str) -> bool {
        self.tool_filter.is_empty() || self.tool_filter.iter().any(|t| t == tool_name)
    }
}

/// A bounded child run requested by the `task` tool.
#[derive(Debug, Clone)]
pub struct SubAgentRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub persona_id: String,
    pub prompt: String,
    /// Depth of the child run (parent depth + 1)
    pub depth: u32,
}

/// What a finished sub-agent run reports back to its parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubAgentOutcome {
    pub session_id: String,
    pub final_message: String,
    pub tool_calls: usize,
    pub failed_tool_calls: usize,
    pub steps: usize,
    pub reason: DoneReason,
}

/// Runs agent turns on behalf of tools.
///
/// Implemented by the engine; the `task` tool only sees this trait, which keeps
/// the tool layer independent from the turn loop.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Runs a sub-agent to completion in its own session.
    async fn run_sub_agent(
        &self,
        request: SubAgentRequest,
        cancel: CancellationToken,
    ) -> Result<SubAgentOutcome>;
}

/// Everything a tool may know about its caller.
#[derive(Clone)]
pub struct ToolContext {
    pub task: TaskContext,
    pub session: Option<Arc<Session>>,
    pub persona: Option<PersonaContext>,
    pub cancel: CancellationToken,
    /// 0 for a top-level turn, incremented per sub-agent level
    pub depth: u32,
    /// Set for calls dispatched by `batch`
    pub in_batch: bool,
    pub runtime: Option<Arc<dyn AgentRuntime>>,
}

impl ToolContext {
    pub fn new(workspace_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            task: TaskContext {
                workspace_id: workspace_id.into(),
                user_id: user_id.into(),
            },
            session: None,
            persona: None,
            cancel: CancellationToken::new(),
            depth: 0,
            in_batch: false,
            runtime: None,
        }
    }

    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = Some(session);
        self
    }

    /// Attaches the persona filter; personas without a filter attach nothing.
    pub fn with_persona(mut self, persona: &Persona) -> Self {
        self.persona = if persona.tool_filter.is_empty() {
            None
        } else {
            Some(PersonaContext::from_persona(persona))
        };
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn AgentRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Context for one call fanned out by `batch`.
    pub fn for_batch(&self) -> Self {
        Self {
            in_batch: true,
            ..self.clone()
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.task.workspace_id
    }

    pub fn user_id(&self) -> &str {
        &self.task.user_id
    }

    /// Workspace a tool should act on.
    ///
    /// Tools accept an optional `workspace_id` argument for the model's benefit;
    /// it must match the turn's workspace.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the argument names another workspace.
    pub fn resolve_workspace(&self, requested: Option<&str>) -> Result<&str> {
        match requested.map(str::trim).filter(|w| !w.is_empty()) {
            Some(ws) if ws != self.task.workspace_id => Err(ForgeError::PermissionDenied(format!(
                "workspace '{ws}' is not the workspace of this session"
            ))),
            _ => Ok(&self.task.workspace_id),
        }
    }

    /// The session this call belongs to.
    ///
    /// # Errors
    ///
    /// Returns `Execution` when the call runs without a session.
    pub fn require_session(&self) -> Result<&Arc<Session>> {
        self.session
            .as_ref()
            .ok_or_else(|| ForgeError::execution("no session attached to this tool call"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_workspace_rejects_other_workspace() {
        let ctx = ToolContext::new("ws1", "u1");
        assert_eq!(ctx.resolve_workspace(None).unwrap(), "ws1");
        assert_eq!(ctx.resolve_workspace(Some("ws1")).unwrap(), "ws1");
        assert_eq!(ctx.resolve_workspace(Some("")).unwrap(), "ws1");
        assert!(ctx.resolve_workspace(Some("ws2")).is_err());
    }

    #[test]
    fn test_for_batch_shares_cancellation() {
        let ctx = ToolContext::new("ws", "u");
        let child = ctx.for_batch();
        assert!(child.in_batch);
        ctx.cancel.cancel();
        assert!(child.cancel.is_cancelled());
    }
}
