//! Built-in persona presets.
//!
//! Registered at boot:
//! - **app_builder**: builds complete apps; plans first; may call every tool
//! - **staff_analyst** / **staff_operator**: end-user staff assistants
//! - **subagent_***: templates the `task` tool clones into transient personas

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::model::{Persona, PersonaKind};
use super::request::staff_envelope;

pub const APP_BUILDER_ID: &str = "app_builder";
pub const STAFF_ANALYST_ID: &str = "staff_analyst";
pub const STAFF_OPERATOR_ID: &str = "staff_operator";

/// Specialised sub-agents reachable through the `task` tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubAgentType {
    DataModeler,
    UiDesigner,
    LogicDeveloper,
}

impl SubAgentType {
    pub fn template_id(self) -> String {
        format!("subagent_{self}")
    }

    pub fn tool_filter(self) -> &'static [&'static str] {
        match self {
            SubAgentType::DataModeler => &[
                "create_table",
                "alter_table",
                "delete_table",
                "insert_data",
                "query_data",
                "get_workspace_info",
            ],
            SubAgentType::UiDesigner => &[
                "get_workspace_info",
                "get_ui_schema",
                "get_block_spec",
                "generate_ui_schema",
                "modify_ui_schema",
                "query_data",
            ],
            SubAgentType::LogicDeveloper => &[
                "get_workspace_info",
                "get_logic",
                "deploy_logic",
                "query_data",
                "query_vm_data",
            ],
        }
    }

    fn name(self) -> &'static str {
        match self {
            SubAgentType::DataModeler => "Data Modeler",
            SubAgentType::UiDesigner => "UI Designer",
            SubAgentType::LogicDeveloper => "Logic Developer",
        }
    }

    fn brief(self) -> &'static str {
        match self {
            SubAgentType::DataModeler => {
                "You design relational schemas for SQLite. Create tables in dependency order \
                 (parents before children), give every table an INTEGER primary key named id, \
                 and insert realistic seed rows so the app is usable immediately."
            }
            SubAgentType::UiDesigner => {
                "You design AppSchema v2.0 user interfaces. Inspect existing tables first, call \
                 get_block_spec before using an unfamiliar block type, and make sure every \
                 data_source.table points at a table that exists."
            }
            SubAgentType::LogicDeveloper => {
                "You write backend JavaScript for the workspace VM. Export routes as \
                 exports.routes = { \"GET /path\": function(ctx) { ... } } and use the db \
                 binding (query, queryOne, exec, insert, update, delete) for data access."
            }
        }
    }

    fn persona(self) -> Persona {
        Persona {
            id: self.template_id(),
            name: self.name().to_string(),
            description: format!("Sub-agent template: {}", self.name()),
            system_prompt: format!(
                "You are the {} sub-agent working inside an AppForge workspace.\n\n{}\n\n\
                 Work autonomously with the tools you have. When the task is done, reply with a \
                 short plain-text summary of what you built and stop calling tools.",
                self.name(),
                self.brief()
            ),
            tool_filter: self.tool_filter().iter().map(|t| t.to_string()).collect(),
            enabled: false,
            kind: PersonaKind::SubAgent,
            suggestions: vec![],
            plan_first: false,
        }
    }
}

/// Returns the preset personas registered at boot.
pub fn get_default_presets() -> Vec<Persona> {
    let mut presets = vec![
        Persona {
            id: APP_BUILDER_ID.to_string(),
            name: "Web Creator".to_string(),
            description: "Builds complete web applications: database, UI, logic and publishing."
                .to_string(),
            // Replaced at request time by the phase-aware builder prompt.
            system_prompt: "You are a Web Creator AI that builds complete web applications inside a Workspace.".to_string(),
            tool_filter: vec![],
            enabled: true,
            kind: PersonaKind::Builder,
            suggestions: vec![
                "Build a task tracker with projects and due dates".to_string(),
                "Create an inventory app with products and suppliers".to_string(),
            ],
            plan_first: true,
        },
        Persona {
            id: STAFF_ANALYST_ID.to_string(),
            name: "Data Analyst".to_string(),
            description: "Answers questions about workspace data without changing it.".to_string(),
            system_prompt: staff_envelope(
                "Data Analyst",
                "You help end users understand the data in this application. Summarise, count and compare records, and explain trends in plain language.",
                false,
            ),
            tool_filter: vec!["get_workspace_info".to_string(), "query_data".to_string()],
            enabled: true,
            kind: PersonaKind::Staff,
            suggestions: vec!["What changed this week?".to_string()],
            plan_first: false,
        },
        Persona {
            id: STAFF_OPERATOR_ID.to_string(),
            name: "Operations Assistant".to_string(),
            description: "Looks up and maintains records on behalf of end users.".to_string(),
            system_prompt: staff_envelope(
                "Operations Assistant",
                "You keep the application's records up to date. Add new entries, correct mistakes and update statuses when the user asks.",
                true,
            ),
            tool_filter: vec![
                "get_workspace_info".to_string(),
                "query_data".to_string(),
                "insert_data".to_string(),
                "update_data".to_string(),
            ],
            enabled: true,
            kind: PersonaKind::Staff,
            suggestions: vec!["Add a new record".to_string()],
            plan_first: false,
        },
    ];
    presets.extend(SubAgentType::iter().map(SubAgentType::persona));
    presets
}
