//! `publish_app`: promote the workspace app from draft to published.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::workspace::WorkspaceStore;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::context::ToolContext;
use super::tool::{Tool, parse_params, resource};

#[derive(Debug, Deserialize)]
struct PublishParams {
    #[serde(default)]
    workspace_id: Option<String>,
}

pub struct PublishAppTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl PublishAppTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for PublishAppTool {
    fn name(&self) -> &str {
        "publish_app"
    }

    fn description(&self) -> &str {
        "Publish the app so end users can reach it. Requires a UI schema."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "workspace_id": {"type": "string"} }
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::WORKSPACE)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: PublishParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        let has_schema = self
            .workspaces
            .current_version(ws)
            .await?
            .is_some_and(|v| v.has_ui_schema());
        if !has_schema {
            return Ok(ToolResult::failure(
                ToolErrorKind::ValidationFailed,
                "cannot publish an app without a UI schema",
            ));
        }
        let workspace = self.workspaces.publish(ws, ctx.user_id()).await?;
        info!(workspace_id = ws, "[Tool:publish_app] App published");
        Ok(ToolResult::ok_with_data(
            format!("'{}' is now {}", workspace.name, workspace.app_status),
            json!({
                "app_status": workspace.app_status.to_string(),
                "published_at": workspace.published_at,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::workspace::{AppStatus, VersionDraft, Workspace};
    use appforge_infrastructure::InMemoryWorkspaceStore;

    #[tokio::test]
    async fn test_publish_requires_schema() {
        let workspaces: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
        workspaces
            .create_workspace(Workspace::new("ws1", "Shop", "u1"))
            .await
            .unwrap();
        let tool = PublishAppTool::new(Arc::clone(&workspaces));
        let ctx = ToolContext::new("ws1", "u1");

        assert!(!tool.execute(&ctx, json!({})).await.unwrap().success);

        workspaces
            .create_version("ws1", "u1", VersionDraft::ui_schema(json!({"pages": []})))
            .await
            .unwrap();
        assert!(tool.execute(&ctx, json!({})).await.unwrap().success);
        let workspace = workspaces.get_workspace("ws1").await.unwrap().unwrap();
        assert_eq!(workspace.app_status, AppStatus::Published);
    }
}
