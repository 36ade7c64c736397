//! `task`: delegate a bounded piece of work to a specialised sub-agent.

use std::sync::Arc;
use std::time::Duration;

use appforge_core::event::DoneReason;
use appforge_core::persona::{PersonaKind, SubAgentType};
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::context::{SubAgentRequest, ToolContext};
use super::support::shorten;
use super::tool::{Tool, parse_params};
use crate::persona_registry::PersonaRegistry;

/// Unregisters the transient persona when the call ends, however it ends.
struct TransientPersona {
    registry: Arc<PersonaRegistry>,
    id: String,
}

impl TransientPersona {
    fn register(registry: &Arc<PersonaRegistry>, kind: SubAgentType) -> Result<Self> {
        let template = registry
            .get(&kind.template_id())
            .ok_or_else(|| ForgeError::not_found("persona", kind.template_id()))?;
        let mut stamp = Utc::now().timestamp_micros();
        let mut id = format!("_subagent_{kind}_{stamp}");
        while registry.contains(&id) {
            stamp += 1;
            id = format!("_subagent_{kind}_{stamp}");
        }
        registry.register(template.clone_as(id.clone(), PersonaKind::Transient));
        Ok(Self {
            registry: Arc::clone(registry),
            id,
        })
    }
}

impl Drop for TransientPersona {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

#[derive(Debug, Deserialize)]
struct TaskParams {
    #[serde(default)]
    description: String,
    prompt: String,
    subagent_type: SubAgentType,
}

pub struct TaskTool {
    personas: Arc<PersonaRegistry>,
    deadline: Duration,
    max_depth: u32,
}

impl TaskTool {
    pub fn new(personas: Arc<PersonaRegistry>, deadline: Duration, max_depth: u32) -> Self {
        Self {
            personas,
            deadline,
            max_depth,
        }
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegate a self-contained job to a specialised sub-agent (data_modeler, ui_designer, \
         logic_developer). The sub-agent works in its own session with a restricted tool set and \
         returns a summary. Not allowed inside batch."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {"type": "string", "description": "Short label for the job"},
                "prompt": {"type": "string", "description": "Full instructions for the sub-agent"},
                "subagent_type": {"type": "string", "enum": ["data_modeler", "ui_designer", "logic_developer"]}
            },
            "required": ["prompt", "subagent_type"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    /// The whole sub-agent run plus a margin for reporting.
    fn timeout(&self) -> Option<Duration> {
        Some(self.deadline + Duration::from_secs(10))
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: TaskParams = parse_params(params)?;
        if ctx.in_batch {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                "task cannot be called inside batch",
            ));
        }
        if ctx.depth >= self.max_depth {
            return Ok(ToolResult::failure(
                ToolErrorKind::ExecutionFailed,
                format!("sub-agent depth limit ({}) reached", self.max_depth),
            ));
        }
        let runtime = ctx
            .runtime
            .clone()
            .ok_or_else(|| ForgeError::execution("sub-agents are not available in this context"))?;

        let persona = TransientPersona::register(&self.personas, p.subagent_type)?;
        info!(
            persona_id = %persona.id,
            depth = ctx.depth + 1,
            description = %p.description,
            "[Tool:task] Sub-agent started"
        );

        let request = SubAgentRequest {
            workspace_id: ctx.workspace_id().to_string(),
            user_id: ctx.user_id().to_string(),
            persona_id: persona.id.clone(),
            prompt: p.prompt,
            depth: ctx.depth + 1,
        };
        let cancel = ctx.cancel.child_token();
        let outcome =
            match tokio::time::timeout(self.deadline, runtime.run_sub_agent(request, cancel.clone()))
                .await
            {
                Ok(outcome) => outcome?,
                Err(_) => {
                    cancel.cancel();
                    warn!(persona_id = %persona.id, "[Tool:task] Sub-agent timed out");
                    return Ok(ToolResult::failure(
                        ToolErrorKind::Timeout,
                        format!("sub-agent exceeded {}s", self.deadline.as_secs()),
                    ));
                }
            };
        drop(persona);

        let output = format!(
            "Sub-agent {} finished ({}) after {} step(s) and {} tool call(s), {} failed.\n\n{}",
            p.subagent_type,
            outcome.reason,
            outcome.steps,
            outcome.tool_calls,
            outcome.failed_tool_calls,
            shorten(&outcome.final_message, 4000)
        );
        let data = serde_json::to_value(&outcome)?;
        match outcome.reason {
            DoneReason::EndTurn | DoneReason::AttemptCompletion => {
                Ok(ToolResult::ok_with_data(output, data))
            }
            DoneReason::Cancelled => Ok(ToolResult::failure(ToolErrorKind::Cancelled, "sub-agent cancelled")
                .with_output(output)
                .with_data(data)),
            reason => Ok(ToolResult::failure(
                ToolErrorKind::ExecutionFailed,
                format!("sub-agent ended with {reason}"),
            )
            .with_output(output)
            .with_data(data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::{AgentRuntime, SubAgentOutcome};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Records the request and whether the transient persona existed during the run.
    struct FakeRuntime {
        personas: Arc<PersonaRegistry>,
        seen: Mutex<Vec<(SubAgentRequest, Vec<String>)>>,
        delay: Duration,
    }

    #[async_trait]
    impl AgentRuntime for FakeRuntime {
        async fn run_sub_agent(
            &self,
            request: SubAgentRequest,
            _cancel: CancellationToken,
        ) -> Result<SubAgentOutcome> {
            let filter = self
                .personas
                .get(&request.persona_id)
                .map(|p| p.tool_filter)
                .unwrap_or_default();
            self.seen.lock().unwrap().push((request.clone(), filter));
            tokio::time::sleep(self.delay).await;
            Ok(SubAgentOutcome {
                session_id: "sub".into(),
                final_message: "Created inventory tables".into(),
                tool_calls: 3,
                failed_tool_calls: 0,
                steps: 2,
                reason: DoneReason::EndTurn,
            })
        }
    }

    fn setup(delay: Duration) -> (Arc<PersonaRegistry>, Arc<FakeRuntime>, TaskTool) {
        let personas = Arc::new(PersonaRegistry::with_presets());
        let runtime = Arc::new(FakeRuntime {
            personas: Arc::clone(&personas),
            seen: Mutex::new(vec![]),
            delay,
        });
        let tool = TaskTool::new(Arc::clone(&personas), Duration::from_secs(300), 2);
        (personas, runtime, tool)
    }

    #[tokio::test]
    async fn test_task_registers_and_removes_transient_persona() {
        let (personas, runtime, tool) = setup(Duration::ZERO);
        let before = personas.list_all().len();
        let ctx = ToolContext::new("ws1", "u1").with_runtime(runtime.clone());

        let result = tool
            .execute(
                &ctx,
                json!({"prompt": "Design schema for an inventory app", "subagent_type": "data_modeler"}),
            )
            .await
            .unwrap();
        assert!(result.success, "{result:?}");
        assert!(result.output.contains("3 tool call(s)"));

        let seen = runtime.seen.lock().unwrap();
        let (request, filter) = &seen[0];
        assert!(request.persona_id.starts_with("_subagent_data_modeler_"));
        assert_eq!(request.depth, 1);
        assert_eq!(filter.len(), 6);
        assert!(filter.contains(&"create_table".to_string()));
        assert_eq!(personas.list_all().len(), before);
    }

    #[tokio::test]
    async fn test_task_rejected_in_batch_and_at_depth_limit() {
        let (_personas, runtime, tool) = setup(Duration::ZERO);
        let ctx = ToolContext::new("ws1", "u1").with_runtime(runtime.clone());
        let args = json!({"prompt": "x", "subagent_type": "ui_designer"});

        let in_batch = tool.execute(&ctx.for_batch(), args.clone()).await.unwrap();
        assert!(!in_batch.success);

        let too_deep = tool
            .execute(&ctx.clone().with_depth(2), args)
            .await
            .unwrap();
        assert!(!too_deep.success);
        assert!(runtime.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_deadline() {
        let (personas, runtime, _) = setup(Duration::from_secs(600));
        let tool = TaskTool::new(Arc::clone(&personas), Duration::from_secs(5), 2);
        let before = personas.list_all().len();
        let ctx = ToolContext::new("ws1", "u1").with_runtime(runtime);
        let result = tool
            .execute(&ctx, json!({"prompt": "x", "subagent_type": "logic_developer"}))
            .await
            .unwrap();
        assert_eq!(result.error_kind, Some(ToolErrorKind::Timeout));
        assert_eq!(personas.list_all().len(), before);
    }
}
