//! Custom persona creation request.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Persona, PersonaKind};

/// Tool that is always available to custom personas.
pub const ALWAYS_ALLOWED_TOOL: &str = "get_workspace_info";

const WRITE_ACTIONS: [&str; 3] = ["insert", "update", "delete"];

const WRITE_RULES: &str = "\
- Before changing records, look them up with query_data and make sure you target the right rows.
- Only touch the tables that belong to your role.
- After every insert, update or delete, tell the user exactly what changed.
- Never invent values. Ask the user when required information is missing.";

const READ_ONLY_RULES: &str = "\
- You have READ-ONLY access. Never try to insert, update or delete data.
- Answer questions with real data fetched through query_data.
- When asked for a change, explain that you can only read data.
- Never invent data. Say so when the answer is not in the database.";

/// Request to create a new custom persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePersonaRequest {
    /// Display name (required)
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Role prompt wrapped in the standard rules envelope (required)
    pub role_prompt: String,

    /// Subset of `query`, `insert`, `update`, `delete`
    #[serde(default)]
    pub allowed_actions: Vec<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,

    /// Explicit id; generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Maps a persona action to the tool that performs it.
pub fn action_tool(action: &str) -> Option<&'static str> {
    match action {
        "query" => Some("query_data"),
        "insert" => Some("insert_data"),
        "update" => Some("update_data"),
        "delete" => Some("delete_data"),
        _ => None,
    }
}

/// Wraps a role prompt in the staff envelope.
pub fn staff_envelope(name: &str, role_prompt: &str, write_capable: bool) -> String {
    let rules = if write_capable {
        WRITE_RULES
    } else {
        READ_ONLY_RULES
    };
    format!(
        "You are **{name}**, a specialized AI staff assistant.\n\n{role}\n\nIMPORTANT RULES:\n{rules}\n\nYou MUST respond with either:\n- A tool call (function_call) to perform a data operation\n- A plain text message with your response or asking for clarification",
        role = role_prompt.trim(),
    )
}

impl CreatePersonaRequest {
    /// Validate the request and return errors if any.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required and cannot be empty".to_string());
        }
        if self.role_prompt.trim().is_empty() {
            return Err("role_prompt is required and cannot be empty".to_string());
        }
        if let Some(unknown) = self
            .allowed_actions
            .iter()
            .find(|a| action_tool(a.as_str()).is_none())
        {
            return Err(format!(
                "unknown action '{unknown}' (expected query, insert, update or delete)"
            ));
        }
        Ok(())
    }

    pub fn is_write_capable(&self) -> bool {
        self.allowed_actions
            .iter()
            .any(|a| WRITE_ACTIONS.contains(&a.as_str()))
    }

    /// Tool filter derived from the allowed actions, `get_workspace_info` always included.
    pub fn tool_filter(&self) -> Vec<String> {
        let mut tools = vec![ALWAYS_ALLOWED_TOOL.to_string()];
        for action in &self.allowed_actions {
            if let Some(tool) = action_tool(action) {
                if !tools.iter().any(|t| t == tool) {
                    tools.push(tool.to_string());
                }
            }
        }
        tools
    }

    /// Convert this request into a Persona.
    pub fn into_persona(self) -> Persona {
        let id = self.id.clone().unwrap_or_else(|| {
            let suffix = Uuid::new_v4().simple().to_string();
            format!("custom_{}_{}", slug(&self.name), &suffix[..8])
        });
        let system_prompt = staff_envelope(&self.name, &self.role_prompt, self.is_write_capable());
        let tool_filter = self.tool_filter();

        Persona {
            id,
            name: self.name,
            description: self.description,
            system_prompt,
            tool_filter,
            enabled: true,
            kind: PersonaKind::Custom,
            suggestions: self.suggestions,
            plan_first: false,
        }
    }
}

fn slug(name: &str) -> String {
    let mut out = String::new();
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "persona".to_string()
    } else {
        trimmed.to_string()
    }
}
