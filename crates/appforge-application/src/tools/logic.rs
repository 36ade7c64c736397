//! Logic layer tools: backend JavaScript and sandboxed frontend components.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::tool::{ToolCost, ToolErrorKind, ToolResult};
use appforge_core::workspace::{ComponentCode, VersionDraft, WorkspaceStore};
use appforge_infrastructure::VmPool;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use super::context::ToolContext;
use super::tool::{Tool, parse_params, resource};

#[derive(Debug, Deserialize)]
struct WorkspaceOnly {
    #[serde(default)]
    workspace_id: Option<String>,
}

fn workspace_only_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "workspace_id": {"type": "string"} }
    })
}

// ============================================================================
// deploy_logic
// ============================================================================

#[derive(Debug, Deserialize)]
struct DeployLogicParams {
    #[serde(default)]
    workspace_id: Option<String>,
    code: String,
}

/// Stores new backend code and swaps the workspace VM.
pub struct DeployLogicTool {
    workspaces: Arc<dyn WorkspaceStore>,
    pool: Arc<VmPool>,
}

impl DeployLogicTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>, pool: Arc<VmPool>) -> Self {
        Self { workspaces, pool }
    }
}

#[async_trait]
impl Tool for DeployLogicTool {
    fn name(&self) -> &str {
        "deploy_logic"
    }

    fn description(&self) -> &str {
        "Deploy backend JavaScript for the workspace. The code must assign `exports.routes` \
         (or `module.exports.routes`), an object keyed by \"METHOD /path/:param\" whose handlers \
         receive {method, path, params, query, headers, body} and may use the `db` binding \
         (query, queryOne, exec, insert, update, delete, tables)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": {"type": "string"},
                "code": {"type": "string", "minLength": 1}
            },
            "required": ["code"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::LOGIC)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: DeployLogicParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        if p.code.trim().is_empty() {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                "code must not be empty",
            ));
        }

        let version = self
            .workspaces
            .update_logic_code(ws, ctx.user_id(), &p.code)
            .await?;
        self.pool.invalidate(ws);

        match self.pool.get_or_create(ws).await {
            Ok(vm) => {
                let routes: Vec<String> = vm.route_keys().into_iter().map(str::to_string).collect();
                info!(workspace_id = ws, version = %version.version_tag, vm_id = vm.id(), routes = routes.len(), "[Tool:deploy_logic] Logic deployed");
                Ok(ToolResult::ok_with_data(
                    format!(
                        "Logic deployed as {} with {} route(s): {}",
                        version.version_tag,
                        routes.len(),
                        routes.join(", ")
                    ),
                    json!({ "version": version.version_tag, "routes": routes }),
                ))
            }
            Err(e) => {
                warn!(workspace_id = ws, error = %e, "[Tool:deploy_logic] Deployed code does not load");
                Ok(ToolResult::failure(
                    ToolErrorKind::ExecutionFailed,
                    format!("code saved as {} but failed to load: {e}", version.version_tag),
                ))
            }
        }
    }
}

// ============================================================================
// get_logic
// ============================================================================

pub struct GetLogicTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl GetLogicTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for GetLogicTool {
    fn name(&self) -> &str {
        "get_logic"
    }

    fn description(&self) -> &str {
        "Return the currently deployed backend code (empty when none)."
    }

    fn parameters(&self) -> Value {
        workspace_only_schema()
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: WorkspaceOnly = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        let code = self
            .workspaces
            .current_version(ws)
            .await?
            .map(|v| v.logic_code)
            .unwrap_or_default();
        let output = if code.is_empty() {
            "No logic deployed".to_string()
        } else {
            code.clone()
        };
        Ok(ToolResult::ok_with_data(output, json!({ "code": code })))
    }
}

// ============================================================================
// deploy_component / list_components
// ============================================================================

fn default_component_name() -> String {
    "main".to_string()
}

#[derive(Debug, Deserialize)]
struct DeployComponentParams {
    #[serde(default)]
    workspace_id: Option<String>,
    #[serde(default = "default_component_name")]
    name: String,
    code: String,
}

pub struct DeployComponentTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl DeployComponentTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for DeployComponentTool {
    fn name(&self) -> &str {
        "deploy_component"
    }

    fn description(&self) -> &str {
        "Store a sandboxed frontend component (JavaScript rendered into ROOT) on a new workspace version. \
         A component with the same name is replaced."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workspace_id": {"type": "string"},
                "name": {"type": "string", "default": "main"},
                "code": {"type": "string", "minLength": 1}
            },
            "required": ["code"]
        })
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Moderate
    }

    fn affected_resource(&self) -> Option<&'static str> {
        Some(resource::LOGIC)
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: DeployComponentParams = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        if p.code.trim().is_empty() {
            return Ok(ToolResult::failure(
                ToolErrorKind::InvalidParameters,
                "code must not be empty",
            ));
        }

        let mut components = self
            .workspaces
            .current_version(ws)
            .await?
            .map(|v| v.component_codes)
            .unwrap_or_default();
        components.retain(|c| c.name != p.name);
        components.push(ComponentCode {
            name: p.name.clone(),
            code: p.code,
            updated_at: Utc::now(),
        });
        let names: Vec<String> = components.iter().map(|c| c.name.clone()).collect();

        let version = self
            .workspaces
            .create_version(ws, ctx.user_id(), VersionDraft::component_codes(components))
            .await?;
        Ok(ToolResult::ok_with_data(
            format!("Component '{}' saved as {}", p.name, version.version_tag),
            json!({ "version": version.version_tag, "components": names }),
        ))
    }
}

pub struct ListComponentsTool {
    workspaces: Arc<dyn WorkspaceStore>,
}

impl ListComponentsTool {
    pub fn new(workspaces: Arc<dyn WorkspaceStore>) -> Self {
        Self { workspaces }
    }
}

#[async_trait]
impl Tool for ListComponentsTool {
    fn name(&self) -> &str {
        "list_components"
    }

    fn description(&self) -> &str {
        "List the frontend components stored on the current version."
    }

    fn parameters(&self) -> Value {
        workspace_only_schema()
    }

    fn cost(&self) -> ToolCost {
        ToolCost::Free
    }

    async fn execute(&self, ctx: &ToolContext, params: Value) -> Result<ToolResult> {
        let p: WorkspaceOnly = parse_params(params)?;
        let ws = ctx.resolve_workspace(p.workspace_id.as_deref())?;
        let components = self
            .workspaces
            .current_version(ws)
            .await?
            .map(|v| v.component_codes)
            .unwrap_or_default();
        let listing: Vec<Value> = components
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "size": c.code.len(),
                    "updated_at": c.updated_at,
                })
            })
            .collect();
        let output = if listing.is_empty() {
            "No components".to_string()
        } else {
            components
                .iter()
                .map(|c| format!("- {} ({} bytes)", c.name, c.code.len()))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Ok(ToolResult::ok_with_data(output, json!({ "components": listing })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::config::VmConfig;
    use appforge_core::workspace::Workspace;
    use appforge_infrastructure::vm::StoreCodeLoader;
    use appforge_infrastructure::{InMemoryWorkspaceStore, VmStore};
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Arc<dyn WorkspaceStore>, Arc<VmPool>) {
        let dir = TempDir::new().unwrap();
        let workspaces: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
        workspaces
            .create_workspace(Workspace::new("ws1", "Shop", "u1"))
            .await
            .unwrap();
        let store = Arc::new(VmStore::new(dir.path()));
        let loader = Arc::new(StoreCodeLoader::new(Arc::clone(&workspaces)));
        let pool = Arc::new(VmPool::new(store, loader, VmConfig::default()));
        (dir, workspaces, pool)
    }

    #[tokio::test]
    async fn test_deploy_logic_swaps_vm_instance() {
        let (_dir, workspaces, pool) = setup().await;
        let ctx = ToolContext::new("ws1", "u1");
        let tool = DeployLogicTool::new(Arc::clone(&workspaces), Arc::clone(&pool));

        let first = tool
            .execute(
                &ctx,
                json!({"code": "exports.routes = { 'GET /ping': () => 'pong' };"}),
            )
            .await
            .unwrap();
        assert!(first.success, "{first:?}");
        let before = pool.get_or_create("ws1").await.unwrap();

        let second = tool
            .execute(
                &ctx,
                json!({"code": "exports.routes = { 'GET /ping': () => 'pong!' };"}),
            )
            .await
            .unwrap();
        assert!(second.success);
        let after = pool.get_or_create("ws1").await.unwrap();
        assert_ne!(before.id(), after.id());
        assert_eq!(after.route_keys(), vec!["GET /ping"]);
    }

    #[tokio::test]
    async fn test_deploy_logic_rejects_empty_code() {
        let (_dir, workspaces, pool) = setup().await;
        let result = DeployLogicTool::new(workspaces, pool)
            .execute(&ToolContext::new("ws1", "u1"), json!({"code": "  "}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_broken_code_reports_failure() {
        let (_dir, workspaces, pool) = setup().await;
        let result = DeployLogicTool::new(workspaces, pool)
            .execute(
                &ToolContext::new("ws1", "u1"),
                json!({"code": "exports.routes = {"}),
            )
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ToolErrorKind::ExecutionFailed));
    }

    #[tokio::test]
    async fn test_component_replaced_by_name() {
        let (_dir, workspaces, _pool) = setup().await;
        let ctx = ToolContext::new("ws1", "u1");
        let deploy = DeployComponentTool::new(Arc::clone(&workspaces));
        deploy
            .execute(&ctx, json!({"code": "ROOT.textContent = 'a';"}))
            .await
            .unwrap();
        deploy
            .execute(&ctx, json!({"name": "main", "code": "ROOT.textContent = 'b';"}))
            .await
            .unwrap();
        deploy
            .execute(&ctx, json!({"name": "chart", "code": "ROOT.textContent = 'c';"}))
            .await
            .unwrap();

        let listed = ListComponentsTool::new(Arc::clone(&workspaces))
            .execute(&ctx, json!({}))
            .await
            .unwrap();
        let components = listed.data.unwrap()["components"].as_array().unwrap().clone();
        assert_eq!(components.len(), 2);
        let version = workspaces.current_version("ws1").await.unwrap().unwrap();
        assert_eq!(version.component("main").unwrap().code, "ROOT.textContent = 'b';");
    }
}
