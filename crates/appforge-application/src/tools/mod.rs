//! Tool catalog: the contract, the registry and every concrete tool.
//!
//! Tools are grouped by layer:
//! - **data**: tables and rows in the workspace database
//! - **ui**: the AppSchema document and the block reference
//! - **logic**: backend JavaScript and frontend components
//! - **orchestration**: plans, batch, sub-agents, completion, personas, publishing

pub mod batch;
pub mod block_spec;
pub mod completion;
pub mod context;
pub mod data;
pub mod logic;
pub mod persona;
pub mod plan;
pub mod publish;
pub mod registry;
pub mod support;
pub mod task;
pub mod tool;
pub mod ui;
pub mod ui_ops;

use std::sync::Arc;
use std::time::Duration;

use appforge_core::config::EngineConfig;
use appforge_core::workspace::WorkspaceStore;
use appforge_infrastructure::{VmPool, VmStore};

pub use batch::{BatchTool, MAX_BATCH_CALLS};
pub use block_spec::{BlockType, GetBlockSpecTool};
pub use completion::{AttemptCompletionTool, IssueCode, ValidationIssue, validate_app};
pub use context::{
    AgentRuntime, PersonaContext, SubAgentOutcome, SubAgentRequest, TaskContext, ToolContext,
};
pub use data::{
    AlterTableTool, CreateTableTool, DeleteDataTool, DeleteTableTool, GetWorkspaceInfoTool,
    InsertDataTool, QueryDataTool, UpdateDataTool,
};
pub use logic::{DeployComponentTool, DeployLogicTool, GetLogicTool, ListComponentsTool};
pub use persona::CreatePersonaTool;
pub use plan::{CreatePlanTool, UpdatePlanTool, render_plan};
pub use publish::PublishAppTool;
pub use registry::{PERSONA_DENIED, ToolRegistry, UNKNOWN_TOOL, failure_from_error};
pub use task::TaskTool;
pub use tool::{Tool, parse_params, resource};
pub use ui::{GenerateUiSchemaTool, GetUiSchemaTool, ModifyUiSchemaTool};
pub use ui_ops::{UiOperation, apply_operations, page_ids};

use crate::persona_registry::PersonaRegistry;

/// Collaborators the built-in tools are wired to.
#[derive(Clone)]
pub struct ToolDeps {
    pub vm_store: Arc<VmStore>,
    pub vm_pool: Arc<VmPool>,
    pub workspaces: Arc<dyn WorkspaceStore>,
    pub personas: Arc<PersonaRegistry>,
    pub config: EngineConfig,
}

/// Builds the registry holding every built-in tool.
///
/// `batch` keeps a weak handle back to the registry it lives in.
pub fn build_registry(deps: &ToolDeps) -> Arc<ToolRegistry> {
    let timeout = Duration::from_secs(deps.config.tool_timeout_secs);
    Arc::new_cyclic(|registry| {
        let tools = ToolRegistry::new(timeout);
        let store = &deps.vm_store;
        let workspaces = &deps.workspaces;

        // data
        tools.register(Arc::new(CreateTableTool::new(Arc::clone(store))));
        tools.register(Arc::new(AlterTableTool::new(Arc::clone(store))));
        tools.register(Arc::new(DeleteTableTool::new(Arc::clone(store))));
        tools.register(Arc::new(InsertDataTool::new(Arc::clone(store))));
        tools.register(Arc::new(UpdateDataTool::new(Arc::clone(store))));
        tools.register(Arc::new(DeleteDataTool::new(Arc::clone(store))));
        tools.register(Arc::new(QueryDataTool::query_data(Arc::clone(store))));
        tools.register(Arc::new(QueryDataTool::query_vm_data(Arc::clone(store))));
        tools.register(Arc::new(GetWorkspaceInfoTool::new(
            Arc::clone(store),
            Arc::clone(workspaces),
        )));

        // ui
        tools.register(Arc::new(GenerateUiSchemaTool::new(Arc::clone(workspaces))));
        tools.register(Arc::new(ModifyUiSchemaTool::new(Arc::clone(workspaces))));
        tools.register(Arc::new(GetUiSchemaTool::new(Arc::clone(workspaces))));
        tools.register(Arc::new(GetBlockSpecTool));

        // logic
        tools.register(Arc::new(DeployLogicTool::new(
            Arc::clone(workspaces),
            Arc::clone(&deps.vm_pool),
        )));
        tools.register(Arc::new(GetLogicTool::new(Arc::clone(workspaces))));
        tools.register(Arc::new(DeployComponentTool::new(Arc::clone(workspaces))));
        tools.register(Arc::new(ListComponentsTool::new(Arc::clone(workspaces))));

        // orchestration
        tools.register(Arc::new(CreatePlanTool));
        tools.register(Arc::new(UpdatePlanTool));
        tools.register(Arc::new(BatchTool::new(registry.clone())));
        tools.register(Arc::new(TaskTool::new(
            Arc::clone(&deps.personas),
            Duration::from_secs(deps.config.task_timeout_secs),
            deps.config.max_sub_agent_depth,
        )));
        tools.register(Arc::new(AttemptCompletionTool::new(
            Arc::clone(store),
            Arc::clone(workspaces),
        )));
        tools.register(Arc::new(CreatePersonaTool::new(Arc::clone(&deps.personas))));
        tools.register(Arc::new(PublishAppTool::new(Arc::clone(workspaces))));

        tools
    })
}
