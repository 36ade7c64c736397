//! System prompt composition and phase-aware tool advertisement.
//!
//! The builder persona gets a prompt assembled from sections that depend on the
//! session phase: while planning it only learns how to gather requirements and
//! propose a plan; once the plan is confirmed it receives the full build guide.
//! Every other persona uses its own system prompt plus the context section.

use std::sync::Arc;

use appforge_core::persona::{Persona, PersonaKind};
use appforge_core::plan::Plan;
use appforge_core::session::SessionPhase;

use crate::complexity::RequestComplexity;
use crate::tools::{Tool, ToolRegistry};

/// Tools advertised to plan-first personas while the session is planning.
pub const PLANNING_TOOLS: [&str; 4] = ["get_workspace_info", "get_ui_schema", "create_plan", "query_data"];

const SECTION_RULE: &str = "====";

/// Session facts injected at the end of every prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub workspace_id: &'a str,
    pub user_id: &'a str,
    pub phase: SessionPhase,
    pub plan: Option<&'a Plan>,
    /// Class of the opening request, steers the planning guide
    pub complexity: Option<RequestComplexity>,
    /// Rendered digest of compacted history
    pub history_digest: Option<&'a str>,
}

/// Tools the model is offered for this persona in this phase.
///
/// The persona filter always applies. Plan-first personas additionally see only
/// `PLANNING_TOOLS` until a plan is confirmed. Dispatch is not affected.
pub fn advertised_tools(
    persona: &Persona,
    phase: SessionPhase,
    registry: &ToolRegistry,
) -> Vec<Arc<dyn Tool>> {
    let tools = registry.list_filtered(&persona.tool_filter);
    if persona.plan_first && phase == SessionPhase::Planning {
        tools
            .into_iter()
            .filter(|t| PLANNING_TOOLS.contains(&t.name()))
            .collect()
    } else {
        tools
    }
}

/// Builds the system prompt for one LLM call.
pub fn build_system_prompt(
    persona: &Persona,
    ctx: &PromptContext<'_>,
    tools: &[Arc<dyn Tool>],
) -> String {
    if persona.kind != PersonaKind::Builder {
        return join_sections(&[persona.system_prompt.clone(), context_section(ctx)]);
    }

    let mut sections = vec![role_section(), tool_table(tools)];
    match ctx.phase {
        SessionPhase::Planning => {
            sections.push(CAPABILITIES.to_string());
            sections.push(PLANNING_GUIDE.to_string());
            sections.push(planning_mode(ctx.complexity).to_string());
        }
        phase => {
            sections.push(TOOL_GUIDELINES.to_string());
            sections.push(CAPABILITIES.to_string());
            if phase == SessionPhase::Confirmed {
                sections.push(PLAN_CONFIRMED_GUIDE.to_string());
            }
            sections.push(EXECUTION_GUIDE.to_string());
            sections.push(BLOCK_TYPES.to_string());
            sections.push(APP_SCHEMA.to_string());
            sections.push(HARD_RULES.to_string());
            sections.push(OBJECTIVE.to_string());
        }
    }
    sections.push(context_section(ctx));
    join_sections(&sections)
}

fn join_sections(sections: &[String]) -> String {
    sections
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn role_section() -> String {
    "You are the AppForge builder. You build complete web applications inside a workspace: \
     database tables, seed data, a multi-page UI, backend logic and staff personas. Every reply \
     is either a tool call or, once the work is finished, a plain-text answer."
        .to_string()
}

/// First sentence of a description, capped for the tool table.
fn table_description(description: &str) -> String {
    let first = match description.find(". ") {
        Some(idx) if idx < 120 => &description[..=idx],
        _ => description,
    };
    let mut text: String = first.chars().take(120).collect();
    if first.chars().count() > 120 {
        text.truncate(text.char_indices().nth(117).map_or(text.len(), |(i, _)| i));
        text.push_str("...");
    }
    text.replace('|', "\\|")
}

fn tool_table(tools: &[Arc<dyn Tool>]) -> String {
    if tools.is_empty() {
        return String::new();
    }
    let mut out = format!("{SECTION_RULE}\n\n# Tools\n\n| Tool | Purpose | Cost |\n|------|---------|------|\n");
    for tool in tools {
        out.push_str(&format!(
            "| {} | {} | {} |\n",
            tool.name(),
            table_description(tool.description()),
            tool.cost()
        ));
    }
    out
}

fn planning_mode(complexity: Option<RequestComplexity>) -> &'static str {
    match complexity {
        Some(RequestComplexity::Simple) => SIMPLE_MODE,
        Some(RequestComplexity::Question) => QUESTION_MODE,
        Some(RequestComplexity::Complex) | None => COMPLEX_MODE,
    }
}

/// Workspace, phase, plan progress and the digest of folded history.
pub fn context_section(ctx: &PromptContext<'_>) -> String {
    let mut out = format!(
        "{SECTION_RULE}\n\n# Context\n\nworkspace_id: {}\nuser_id: {}\nSession phase: {}",
        ctx.workspace_id, ctx.user_id, ctx.phase
    );
    if let Some(plan) = ctx.plan {
        let progress = plan.progress();
        out.push_str(&format!(
            "\nPlan: {} ({}, {} steps)",
            plan.title, plan.status, progress.total
        ));
        if !plan.summary.is_empty() {
            out.push_str(&format!("\nRequirements: {}", plan.summary));
        }
        out.push_str(&format!(
            "\nProgress: {}/{} completed",
            progress.completed, progress.total
        ));
        if progress.in_progress > 0 {
            out.push_str(&format!(", {} in progress", progress.in_progress));
        }
        if progress.failed > 0 {
            out.push_str(&format!(", {} failed", progress.failed));
        }
    }
    if let Some(digest) = ctx.history_digest {
        out.push_str(&format!("\n\n## Earlier in this session\n\n{digest}"));
    }
    out
}

// ============================================================================
// Static sections
// ============================================================================

const TOOL_GUIDELINES: &str = "\
====

# Using tools

1. Check what you already know before reaching for a tool.
2. Pick the single tool that fits the current step.
3. Independent calls can go into one batch call; dependent calls run one after another.
4. Read every result before the next step. A call has only succeeded once its result says so.
5. Call get_block_spec before writing a block type you have not used in this session.";

const CAPABILITIES: &str = "\
====

# Capabilities

- SQLite tables per workspace: create, alter, drop, insert, update, delete, arbitrary SQL.
- Multi-page UIs described as AppSchema v2.0 with 16 block types.
- Sandboxed frontend components (JavaScript rendered into ROOT with DATA).
- Backend JavaScript routes with a `db` binding.
- Staff personas that end users can chat with.
- Publishing the app.";

const PLANNING_GUIDE: &str = "\
====

# Planning

You are gathering requirements. Nothing is built in this phase.

1. Call get_workspace_info to see what already exists.
2. If the request is vague, ask at most three short questions about entities, screens and roles.
   Answer informational questions directly without a plan.
3. When the goal is clear, call create_plan with a title, a one-paragraph summary and concrete
   steps. Group steps by layer (data, ui, logic) and name the tool each step will use.
4. After create_plan, stop and summarise the plan for the user. Building starts only after the
   user confirms it.";

const SIMPLE_MODE: &str = "\
## Mode: simple request

The request is a single, concrete change. Skip the questions and call create_plan right away
with one to three steps. Ask only if something essential is missing, such as the table name.";

const QUESTION_MODE: &str = "\
## Mode: question

The user is asking, not building. Answer directly, using read-only tools such as
get_workspace_info or query_data when the answer depends on the workspace. Do not call
create_plan.";

const COMPLEX_MODE: &str = "\
## Mode: new application

Gather requirements before planning: entities and their fields, the pages and views, business
rules and the most important feature. Ask the two or three most critical questions first and
finish the questions within three rounds.";

const PLAN_CONFIRMED_GUIDE: &str = "\
====

# Plan confirmed

The user approved the plan. Start with the first pending step: mark it in_progress with
update_plan, do the work, then mark it completed (or failed with a note). Keep going step by step
without asking for permission again.";

const EXECUTION_GUIDE: &str = "\
====

# Build order

- Assess: get_workspace_info, and get_ui_schema before changing an existing UI.
- Data: create tables parents first, every table with an INTEGER primary key id, then insert
  realistic seed rows. Verify with query_data.
- UI: generate_ui_schema for a new app, modify_ui_schema for targeted edits. Every
  data_source.table and config.table_name must name an existing table.
- Verify and finish: call attempt_completion. If it reports issues, fix each one before
  calling it again.
- Plans: keep update_plan in sync with the work so the user sees progress.
- Parallel work: batch independent calls (at most 25, no nested batch or task).
- Delegation: task hands a self-contained job to data_modeler, ui_designer or logic_developer.
- Failures: read the error, correct the call and retry once; after repeated failures report
  the exact problem instead of looping.";

const BLOCK_TYPES: &str = "\
====

# Block types

stats_card, data_table, form, chart, detail_view, markdown, image, hero, tabs_container, list,
divider, custom_code, auth, file_upload, calendar, form_dialog.
Data-bound blocks (stats_card, data_table, chart, list, calendar) need `data_source.table`;
form, detail_view and form_dialog use `config.table_name`. Call get_block_spec for the full
config of a type.";

const APP_SCHEMA: &str = r#"====

# AppSchema v2.0

generate_ui_schema takes a document of this shape:

```json
{
  "app_schema_version": "2.0.0",
  "app_name": "Inventory",
  "default_page": "dashboard",
  "navigation": {
    "type": "sidebar",
    "items": [{"page_id": "dashboard", "label": "Dashboard", "icon": "LayoutDashboard"}]
  },
  "pages": [
    {
      "id": "dashboard",
      "title": "Dashboard",
      "route": "/dashboard",
      "blocks": [
        {
          "id": "stat_items",
          "type": "stats_card",
          "config": {"label": "Items", "value_key": "n", "format": "number"},
          "data_source": {"table": "items", "aggregation": [{"function": "count", "column": "*", "alias": "n"}]}
        }
      ]
    }
  ]
}
```

Blocks carry id, type, optional label, config, optional data_source and optional grid
({col_span, row_span}). Pages with "hidden": true stay out of navigation and are reached
through row_click_action or click_action."#;

const HARD_RULES: &str = "\
====

# Hard rules

- Never reference a table in the UI before it exists.
- Start every conversation with get_workspace_info.
- Read the current schema with get_ui_schema before modify_ui_schema.
- Never guess data; query it.
- Never declare the app finished without a successful attempt_completion.
- Never leave the app broken after an error; fix it or report exactly what is wrong.
- Final answers are statements, not questions, and skip filler openers.";

const OBJECTIVE: &str = "\
====

# Objective

Work through the goal one verified step at a time. When everything is in place, call
attempt_completion and present the result.";

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::persona::{APP_BUILDER_ID, STAFF_ANALYST_ID, get_default_presets};
    use appforge_core::plan::{PlanStep, StepStatus};
    use std::time::Duration;

    fn preset(id: &str) -> Persona {
        get_default_presets()
            .into_iter()
            .find(|p| p.id == id)
            .unwrap()
    }

    fn plan() -> Plan {
        let step = |id: &str, status| PlanStep {
            id: id.into(),
            description: id.into(),
            tool: None,
            status,
            note: None,
            group_id: None,
        };
        Plan::draft(
            "Shop",
            "Orders and customers",
            vec![],
            vec![
                step("a", StepStatus::Completed),
                step("b", StepStatus::InProgress),
                step("c", StepStatus::Pending),
            ],
        )
    }

    #[test]
    fn test_builder_prompt_sections_follow_phase() {
        let builder = preset(APP_BUILDER_ID);
        let ctx = |phase| PromptContext {
            workspace_id: "ws1",
            user_id: "u1",
            phase,
            plan: None,
            complexity: None,
            history_digest: None,
        };

        let planning = build_system_prompt(&builder, &ctx(SessionPhase::Planning), &[]);
        assert!(planning.contains("# Planning"));
        assert!(!planning.contains("# AppSchema v2.0"));

        let confirmed = build_system_prompt(&builder, &ctx(SessionPhase::Confirmed), &[]);
        assert!(confirmed.contains("# Plan confirmed"));
        assert!(confirmed.contains("# AppSchema v2.0"));

        let executing = build_system_prompt(&builder, &ctx(SessionPhase::Executing), &[]);
        assert!(!executing.contains("# Plan confirmed"));
        assert!(executing.contains("# Hard rules"));
        assert!(executing.ends_with("Session phase: executing"));
    }

    #[test]
    fn test_context_reports_plan_progress() {
        let plan = plan();
        let text = context_section(&PromptContext {
            workspace_id: "ws1",
            user_id: "u1",
            phase: SessionPhase::Executing,
            plan: Some(&plan),
            complexity: None,
            history_digest: Some("4 earlier messages were folded."),
        });
        assert!(text.contains("Plan: Shop (draft, 3 steps)"));
        assert!(text.contains("Progress: 1/3 completed, 1 in progress"));
        assert!(!text.contains("failed"));
        assert!(text.ends_with("## Earlier in this session\n\n4 earlier messages were folded."));
    }

    #[test]
    fn test_planning_mode_follows_request_complexity() {
        let builder = preset(APP_BUILDER_ID);
        let prompt = |complexity| {
            build_system_prompt(
                &builder,
                &PromptContext {
                    workspace_id: "ws1",
                    user_id: "u1",
                    phase: SessionPhase::Planning,
                    plan: None,
                    complexity,
                    history_digest: None,
                },
                &[],
            )
        };
        assert!(prompt(Some(RequestComplexity::Simple)).contains("## Mode: simple request"));
        assert!(prompt(Some(RequestComplexity::Question)).contains("## Mode: question"));
        assert!(prompt(None).contains("## Mode: new application"));

        let executing = build_system_prompt(
            &builder,
            &PromptContext {
                workspace_id: "ws1",
                user_id: "u1",
                phase: SessionPhase::Executing,
                plan: None,
                complexity: Some(RequestComplexity::Simple),
                history_digest: None,
            },
            &[],
        );
        assert!(!executing.contains("## Mode:"));
    }

    #[test]
    fn test_staff_prompt_is_persona_prompt_plus_context() {
        let staff = preset(STAFF_ANALYST_ID);
        let prompt = build_system_prompt(
            &staff,
            &PromptContext {
                workspace_id: "ws1",
                user_id: "u1",
                phase: SessionPhase::Planning,
                plan: None,
                complexity: None,
                history_digest: None,
            },
            &[],
        );
        assert!(prompt.starts_with(staff.system_prompt.trim()));
        assert!(prompt.contains("workspace_id: ws1"));
        assert!(!prompt.contains("# Planning"));
    }

    #[test]
    fn test_planning_phase_limits_advertised_tools() {
        use crate::tools::{CreatePlanTool, GetBlockSpecTool, UpdatePlanTool};

        let registry = ToolRegistry::new(Duration::from_secs(5));
        registry.register(Arc::new(CreatePlanTool));
        registry.register(Arc::new(UpdatePlanTool));
        registry.register(Arc::new(GetBlockSpecTool));
        let builder = preset(APP_BUILDER_ID);

        let planning = advertised_tools(&builder, SessionPhase::Planning, &registry);
        let names: Vec<&str> = planning.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["create_plan"]);

        let executing = advertised_tools(&builder, SessionPhase::Executing, &registry);
        assert_eq!(executing.len(), 3);

        let table = tool_table(&executing);
        assert!(table.contains("| get_block_spec |"));
        assert!(table.contains("| FREE |"));
    }

    #[test]
    fn test_table_description_takes_first_sentence() {
        assert_eq!(table_description("Does a. Then b."), "Does a.");
        let long = "x".repeat(200);
        let short = table_description(&long);
        assert_eq!(short.chars().count(), 120);
        assert!(short.ends_with("..."));
    }
}
