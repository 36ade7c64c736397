//! Persona domain model.
//!
//! A persona is a named agent identity: a system prompt plus the closed
//! allow-list of tools it may call.

use serde::{Deserialize, Serialize};

/// How a persona came to exist, which also decides how its prompt is composed.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersonaKind {
    /// The app builder; its prompt is assembled per phase.
    Builder,
    /// Built-in staff assistant for end users
    Staff,
    /// Template cloned by the `task` tool
    SubAgent,
    /// Created at runtime by `create_persona`
    #[default]
    Custom,
    /// Ephemeral clone of a sub-agent template, alive for one `task` call
    Transient,
}

/// A persona representing an AI agent with a fixed tool allow-list.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Persona {
    /// Unique identifier
    pub id: String,
    /// Display name of the persona
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    /// Closed allow-list of tool names; empty means every tool is permitted
    #[serde(default)]
    pub tool_filter: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub kind: PersonaKind,
    /// Conversation starters shown to end users
    #[serde(default)]
    pub suggestions: Vec<String>,
    /// Whether the persona gathers requirements and plans before building
    #[serde(default)]
    pub plan_first: bool,
}

fn default_enabled() -> bool {
    true
}

impl Persona {
    /// Returns true when the persona may call `tool_name`.
    pub fn allows(&self, tool_name: &str) -> bool {
        self.tool_filter.is_empty() || self.tool_filter.iter().any(|t| t == tool_name)
    }

    /// Returns a copy registered under another id and kind.
    pub fn clone_as(&self, id: impl Into<String>, kind: PersonaKind) -> Self {
        Self {
            id: id.into(),
            kind,
            enabled: true,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(filter: &[&str]) -> Persona {
        Persona {
            id: "p".into(),
            name: "P".into(),
            description: String::new(),
            system_prompt: String::new(),
            tool_filter: filter.iter().map(|s| s.to_string()).collect(),
            enabled: true,
            kind: PersonaKind::Custom,
            suggestions: vec![],
            plan_first: false,
        }
    }

    #[test]
    fn test_empty_filter_allows_everything() {
        assert!(persona(&[]).allows("delete_table"));
    }

    #[test]
    fn test_filter_is_closed() {
        let p = persona(&["query_data"]);
        assert!(p.allows("query_data"));
        assert!(!p.allows("insert_data"));
    }
}
