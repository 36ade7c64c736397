//! `create_persona`: register a staff persona described by the model.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::persona::CreatePersonaRequest;
use appforge_core::tool::{ToolCost, ToolResult};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::context::ToolContext;
use super::tool::{Tool, parse_params, resource};
use crate::persona_registry::PersonaRegistry;

pub struct CreatePersonaTool {
    personas: Arc<PersonaRegistry>,
}

impl CreatePersonaTool {
    pub fn new(personas: Arc<PersonaRegistry>) -> Self {
        Self { personas }
    }
}

#[async_trait]
impl Tool for CreatePersonaTool {
    fn name(&self) -> &str {
        "create_persona"
    }

    fn description(&self) -> &str {
        "Create an AI staff persona for the app's end users. allowed_actions is a subset of \
         query, insert, update, delete and decides which data tools the persona may call."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "description": {"type": "string"},
                "role_prompt": {"type": "string", "description": "What the persona does and knows"},
                "allowed_actions": {
                    "type": "array",
                    "items": {"type": "string", "enum": ["query", "insert", "update", "delete"]}
                },
                "suggestions": {"type": "array", "items": {"type": "string"}},
                "id": {"type": "string"}
            },
            "required": ["name", "role_prompt"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::PERSONA)
    }

    async fn execute(&self, _ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let request: CreatePersonaRequest = parse_params(params)?;
        let persona = self.personas.register_custom(request)?;
        Ok(ToolResult::ok_with_data(
            format!(
                "Persona '{}' created with id {} and tools: {}",
                persona.name,
                persona.id,
                persona.tool_filter.join(", ")
            ),
            json!({
                "id": persona.id,
                "name": persona.name,
                "tool_filter": persona.tool_filter,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::persona::PersonaKind;

    #[tokio::test]
    async fn test_create_read_only_persona() {
        let personas = Arc::new(PersonaRegistry::empty());
        let result = CreatePersonaTool::new(Arc::clone(&personas))
            .execute(
                &ToolContext::new("ws", "u"),
                json!({
                    "id": "desk",
                    "name": "Front Desk",
                    "role_prompt": "You answer questions about bookings.",
                    "allowed_actions": ["query"]
                }),
            )
            .await
            .unwrap();
        assert!(result.success);
        let persona = personas.get("desk").unwrap();
        assert_eq!(persona.kind, PersonaKind::Custom);
        assert!(persona.allows("query_data"));
        assert!(!persona.allows("insert_data"));
    }
}
