//! Planning tools. Both operate on the plan held by the calling session.

use appforge_core::Result;
use appforge_core::plan::{Plan, PlanGroup, PlanStep, StepStatus};
use appforge_core::tool::{ToolCost, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::context::ToolContext;
use super::tool::{Tool, parse_params, resource};

#[derive(Debug, Deserialize)]
struct StepInput {
    #[serde(default)]
    id: String,
    description: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatePlanParams {
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    groups: Vec<PlanGroup>,
    steps: Vec<StepInput>,
}

/// Renders a plan as a checklist for the model.
pub fn render_plan(plan: &Plan) -> String {
    let progress = plan.progress();
    let mut out = format!(
        "Plan: {} ({}, {}/{} completed)\n",
        plan.title, plan.status, progress.completed, progress.total
    );
    for step in &plan.steps {
        let mark = match step.status {
            StepStatus::Pending => "[ ]",
            StepStatus::InProgress => "[~]",
            StepStatus::Completed => "[x]",
            StepStatus::Failed => "[!]",
        };
        out.push_str(&format!("{mark} {}: {}", step.id, step.description));
        if let Some(tool) = &step.tool {
            out.push_str(&format!(" ({tool})"));
        }
        if let Some(note) = &step.note {
            out.push_str(&format!(" - {note}"));
        }
        out.push('\n');
    }
    out
}

pub struct CreatePlanTool;

#[async_trait]
impl Tool for CreatePlanTool {
    fn name(&self) -> &str {
        "create_plan"
    }

    fn description(&self) -> &str {
        "Propose a plan (TodoList) for the user to confirm before building. Replaces any previous plan; \
         the session waits for confirmation afterwards."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "summary": {"type": "string"},
                "groups": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "label": {"type": "string"},
                            "icon": {"type": "string"}
                        },
                        "required": ["id", "label"]
                    }
                },
                "steps": {
                    "type": "array",
                    "minItems": 1,
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "description": {"type": "string"},
                            "tool": {"type": "string"},
                            "group_id": {"type": "string"}
                        },
                        "required": ["description"]
                    }
                }
            },
            "required": ["title", "steps"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::PLAN)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: CreatePlanParams = parse_params(params)?;
        let session = ctx.require_session()?;
        let steps = p
            .steps
            .into_iter()
            .map(|s| PlanStep {
                id: s.id,
                description: s.description,
                tool: s.tool,
                status: StepStatus::Pending,
                note: None,
                group_id: s.group_id,
            })
            .collect();
        let plan = Plan::draft(p.title, p.summary, p.groups, steps);
        session.set_plan(plan.clone())?;
        info!(session_id = session.id(), steps = plan.steps.len(), "[Tool:create_plan] Draft plan stored");

        let mut output = render_plan(&plan);
        output.push_str("\nThe plan is waiting for user confirmation. Stop here and summarise it for the user.");
        Ok(ToolResult::ok_with_data(output, serde_json::to_value(&plan)?))
    }
}

#[derive(Debug, Deserialize)]
struct UpdatePlanParams {
    step_id: String,
    status: StepStatus,
    #[serde(default)]
    note: Option<String>,
}

pub struct UpdatePlanTool;

#[async_trait]
impl Tool for UpdatePlanTool {
    fn name(&self) -> &str {
        "update_plan"
    }

    fn description(&self) -> &str {
        "Update the status of one plan step. Mark a step in_progress before working on it and completed (or failed) after."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "step_id": {"type": "string"},
                "status": {"type": "string", "enum": ["pending", "in_progress", "completed", "failed"]},
                "note": {"type": "string"}
            },
            "required": ["step_id", "status"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::PLAN)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: UpdatePlanParams = parse_params(params)?;
        let session = ctx.require_session()?;
        let update = session.update_step(&p.step_id, p.status, p.note)?;

        let mut output = format!("Step {} is now {}\n", p.step_id, p.status);
        output.push_str(&render_plan(&update.plan));
        if update.plan_completed {
            output.push_str("\nAll steps are done. Call attempt_completion to validate the app.");
        }
        Ok(ToolResult::ok_with_data(output, serde_json::to_value(&update.plan)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use appforge_core::plan::PlanStatus;
    use appforge_core::session::SessionPhase;
    use std::sync::Arc;

    fn ctx() -> (Arc<Session>, ToolContext) {
        let session = Arc::new(Session::new("s1", "ws1", "u1", "app_builder"));
        let ctx = ToolContext::new("ws1", "u1").with_session(Arc::clone(&session));
        (session, ctx)
    }

    #[tokio::test]
    async fn test_create_plan_assigns_ids_and_stays_draft() {
        let (session, ctx) = ctx();
        let result = CreatePlanTool
            .execute(
                &ctx,
                json!({
                    "title": "Employee App",
                    "steps": [
                        {"description": "tables", "tool": "create_table"},
                        {"description": "seed", "tool": "insert_data"}
                    ]
                }),
            )
            .await
            .unwrap();
        assert!(result.success);
        let plan = session.plan().unwrap();
        assert_eq!(plan.status, PlanStatus::Draft);
        assert_eq!(plan.steps[1].id, "step_2");
        assert_eq!(session.phase(), SessionPhase::Planning);
    }

    #[tokio::test]
    async fn test_update_plan_completes_executing_session() {
        let (session, ctx) = ctx();
        CreatePlanTool
            .execute(
                &ctx,
                json!({"title": "App", "steps": [{"id": "s1", "description": "one"}]}),
            )
            .await
            .unwrap();
        session.confirm_plan().unwrap();
        session.start_execution();

        let result = UpdatePlanTool
            .execute(&ctx, json!({"step_id": "s1", "status": "completed"}))
            .await
            .unwrap();
        assert!(result.output.contains("attempt_completion"));
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(session.plan().unwrap().status, PlanStatus::Completed);
    }

    #[tokio::test]
    async fn test_update_unknown_step_is_error() {
        let (_session, ctx) = ctx();
        CreatePlanTool
            .execute(&ctx, json!({"title": "App", "steps": [{"description": "one"}]}))
            .await
            .unwrap();
        let err = UpdatePlanTool
            .execute(&ctx, json!({"step_id": "ghost", "status": "completed"}))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_render_plan_marks_status() {
        let mut plan = Plan::draft(
            "App",
            "",
            vec![],
            vec![PlanStep {
                id: "a".into(),
                description: "do a".into(),
                tool: Some("create_table".into()),
                status: StepStatus::Completed,
                note: Some("done".into()),
                group_id: None,
            }],
        );
        plan.status = PlanStatus::InProgress;
        let text = render_plan(&plan);
        assert!(text.contains("[x] a: do a (create_table) - done"));
        assert!(text.contains("1/1 completed"));
    }
}
