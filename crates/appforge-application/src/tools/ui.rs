//! UI layer tools: the AppSchema document stored on workspace versions.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::workspace::{VersionDraft, WorkspaceStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::context::ToolContext;
use super::support::pretty;
use super::tool::{Tool, parse_params, resource};
use super::ui_ops::{apply_operations, page_ids, parse_operations};

// ============================================================================
// generate_ui_schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenerateParams {
    #[serde(default)]
    workspace_id: Option<String>,
    ui_schema: Value,
}

pub struct GenerateUiSchemaTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl GenerateUiSchemaTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for GenerateUiSchemaTool {
    fn name(&self) -> &str {
        "generate_ui_schema"
    }

    fn description(&self) -> &str {
        "Replace the whole UI schema (AppSchema v2.0) and store it as a new workspace version."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": {"type": "string"},
                "ui_schema": {
                    "type": "object",
                    "description": "AppSchema document: version, app_name, navigation, pages[], default_page"
                }
            },
            "required": ["ui_schema"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::UI_SCHEMA)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: GenerateParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        let pages = page_ids(&p.ui_schema);
        let version = self
            .workspaces
            .create_version(ws, ctx.user_id(), VersionDraft::ui_schema(p.ui_schema))
            .await?;
        info!(workspace_id = ws, version = %version.version_tag, pages = pages.len(), "[Tool:generate_ui_schema] Schema stored");
        Ok(ToolResult::ok_with_data(
            format!(
                "UI schema saved as {} with {} page(s): {}",
                version.version_tag,
                pages.len(),
                pages.join(", ")
            ),
            json!({ "version": version.version_tag, "pages": pages }),
        ))
    }
}

// ============================================================================
// modify_ui_schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct ModifyParams {
    #[serde(default)]
    workspace_id: Option<String>,
    operations: Vec<Value>,
}

pub struct ModifyUiSchemaTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl ModifyUiSchemaTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for ModifyUiSchemaTool {
    fn name(&self) -> &str {
        "modify_ui_schema"
    }

    fn description(&self) -> &str {
        "Apply incremental edits to the UI schema. Ops: add_page{page}, update_page{page_id, updates}, \
         remove_page{page_id}, set_app_name{app_name}, set_navigation{navigation}, \
         update_block{page_id, block_index, block}. Invalid or no-op entries are skipped."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": {"type": "string"},
                "operations": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "op": {
                                "type": "string",
                                "enum": ["add_page", "update_page", "remove_page", "set_app_name", "set_navigation", "update_block"]
                            }
                        },
                        "required": ["op"]
                    },
                    "minItems": 1
                }
            },
            "required": ["operations"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::UI_SCHEMA)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: ModifyParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;

        let mut schema = self
            .workspaces
            .current_version(ws)
            .await?
            .and_then(|v| v.ui_schema)
            .unwrap_or_else(|| json!({}));

        let (ops, mut skipped) = parse_operations(&p.operations);
        let report = apply_operations(&mut schema, &ops);
        skipped.extend(report.skipped);

        if report.applied.is_empty() {
            return Ok(ToolResult::failure(
                ToolErrorKind::ExecutionFailed,
                "no operations were applied",
            )
            .with_output(format!("Skipped: {}", skipped.join("; "))));
        }

        let version = self
            .workspaces
            .create_version(ws, ctx.user_id(), VersionDraft::ui_schema(schema.clone()))
            .await?;
        let mut output = format!(
            "Applied {}/{} operation(s); schema saved as {}",
            report.applied.len(),
            p.operations.len(),
            version.version_tag
        );
        if !skipped.is_empty() {
            output.push_str(&format!("\nSkipped: {}", skipped.join("; ")));
        }
        Ok(ToolResult::ok_with_data(
            output,
            json!({
                "version": version.version_tag,
                "applied": report.applied,
                "skipped": skipped,
                "pages": page_ids(&schema),
            }),
        ))
    }
}

// ============================================================================
// get_ui_schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct GetParams {
    #[serde(default)]
    workspace_id: Option<String>,
}

pub struct GetUiSchemaTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl GetUiSchemaTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for GetUiSchemaTool {
    fn name(&self) -> &str {
        "get_ui_schema"
    }

    fn description(&self) -> &str {
        "Return the current UI schema, or an empty object when none exists."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "workspace_id": {"type": "string"} }
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: GetParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        let version = self.workspaces.current_version(ws).await?;
        let schema = version
            .as_ref()
            .and_then(|v| v.ui_schema.clone())
            .unwrap_or_else(|| json!({}));
        let tag = version.map(|v| v.version_tag);
        Ok(ToolResult::ok_with_data(
            pretty(&schema),
            json!({ "version": tag, "ui_schema": schema }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::workspace::Workspace;
    use appforge_infrastructure::InMemoryWorkspaceStore;

    async fn store() -> Arc<dyn WorkspaceStore> {
        let store: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
        store
            .create_workspace(Workspace::new("ws1", "Shop", "u1"))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_generate_then_modify_creates_versions() {
        let workspaces = store().await;
        let ctx = ToolContext::new("ws1", "u1");

        let generated = GenerateUiSchemaTool::new(Arc::clone(&workspaces))
            .execute(
                &ctx,
                json!({"ui_schema": {"app_name": "Shop", "pages": [{"id": "home", "blocks": []}]}}),
            )
            .await
            .unwrap();
        assert!(generated.success);

        let modified = ModifyUiSchemaTool::new(Arc::clone(&workspaces))
            .execute(
                &ctx,
                json!({"operations": [
                    {"op": "set_app_name", "app_name": "Store"},
                    {"op": "bogus"}
                ]}),
            )
            .await
            .unwrap();
        assert!(modified.success, "{modified:?}");

        let current = workspaces.current_version("ws1").await.unwrap().unwrap();
        assert_eq!(current.number, 2);
        assert_eq!(current.ui_schema.unwrap()["app_name"], "Store");
    }

    #[tokio::test]
    async fn test_modify_with_nothing_applied_fails() {
        let workspaces = store().await;
        let ctx = ToolContext::new("ws1", "u1");
        let result = ModifyUiSchemaTool::new(Arc::clone(&workspaces))
            .execute(
                &ctx,
                json!({"operations": [{"op": "remove_page", "page_id": "ghost"}]}),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert!(workspaces.current_version("ws1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_without_schema_is_empty_object() {
        let workspaces = store().await;
        let result = GetUiSchemaTool::new(workspaces)
            .execute(&ToolContext::new("ws1", "u1"), json!({}))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["ui_schema"], json!({}));
    }
}
