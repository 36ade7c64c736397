use std::collections::BTreeSet;
use std::sync::Arc;

use appforge_application::tools::{ToolDeps, build_registry, page_ids};
use appforge_application::{PersonaRegistry, Session, ToolContext, ToolRegistry};
use appforge_core::config::{EngineConfig, VmConfig};
use appforge_core::persona::CreatePersonaRequest;
use appforge_core::plan::PlanStatus;
use appforge_core::session::SessionPhase;
use appforge_core::tool::ToolErrorKind;
use appforge_core::workspace::{Workspace, WorkspaceStore};
use appforge_infrastructure::vm::StoreCodeLoader;
use appforge_infrastructure::{InMemoryWorkspaceStore, VmPool, VmStore};
use serde_json::{Value, json};
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    deps: ToolDeps,
    registry: Arc<ToolRegistry>,
}

async fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let workspaces: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
    workspaces
        .create_workspace(Workspace::new("ws1", "Test", "u1"))
        .await
        .unwrap();
    let vm_store = Arc::new(VmStore::new(dir.path().join("vm")));
    let loader = Arc::new(StoreCodeLoader::new(Arc::clone(&workspaces)));
    let vm_pool = Arc::new(VmPool::new(
        Arc::clone(&vm_store),
        loader,
        VmConfig::default(),
    ));
    let deps = ToolDeps {
        vm_store,
        vm_pool,
        workspaces,
        personas: Arc::new(PersonaRegistry::with_presets()),
        config: EngineConfig::default(),
    };
    let registry = build_registry(&deps);
    Harness {
        _dir: dir,
        deps,
        registry,
    }
}

fn ctx() -> ToolContext {
    ToolContext::new("ws1", "u1")
}

fn tasks_table(name: &str) -> Value {
    json!({
        "name": name,
        "columns": [
            {"name": "id", "type": "INTEGER", "primary_key": true},
            {"name": "title", "type": "TEXT", "nullable": false},
            {"name": "done", "type": "BOOLEAN"}
        ]
    })
}

fn table_names(h: &Harness) -> BTreeSet<String> {
    h.deps
        .vm_store
        .table_names("ws1")
        .unwrap()
        .into_iter()
        .collect()
}

#[tokio::test]
async fn test_create_table_twice_is_a_noop() {
    let h = harness().await;
    let first = h.registry.execute(&ctx(), "create_table", tasks_table("tasks")).await;
    assert!(first.success, "{first:?}");
    let second = h.registry.execute(&ctx(), "create_table", tasks_table("tasks")).await;
    assert!(second.success, "{second:?}");
    assert_eq!(table_names(&h), BTreeSet::from(["tasks".to_string()]));
}

#[tokio::test]
async fn test_batch_creates_tables_concurrently() {
    let h = harness().await;
    let calls: Vec<Value> = ["a", "b", "c"]
        .iter()
        .map(|name| json!({"tool": "create_table", "parameters": tasks_table(name)}))
        .collect();
    let result = h
        .registry
        .execute(&ctx(), "batch", json!({"tool_calls": calls}))
        .await;
    assert!(result.success, "{result:?}");
    assert!(result.output.starts_with("Batch: 3/3 successful"));
    let names = table_names(&h);
    for name in ["a", "b", "c"] {
        assert!(names.contains(name));
    }
}

#[tokio::test]
async fn test_batch_rejects_nested_calls_without_failing_siblings() {
    let h = harness().await;
    let result = h
        .registry
        .execute(
            &ctx(),
            "batch",
            json!({"tool_calls": [
                {"tool": "create_table", "parameters": tasks_table("kept")},
                {"tool": "batch", "parameters": {"tool_calls": [
                    {"tool": "create_table", "parameters": tasks_table("nested")}
                ]}},
                {"tool": "task", "parameters": {"prompt": "x", "subagent_type": "data_modeler"}}
            ]}),
        )
        .await;

    assert!(result.success, "{result:?}");
    assert!(result.output.starts_with("Batch: 1/3 successful"));
    assert!(result.output.contains("[1] batch: Error: batch cannot be called inside batch"));
    let data = result.data.unwrap();
    assert_eq!(data["succeeded"], 1);
    assert_eq!(data["failed"], 2);
    let results = data["results"].as_array().unwrap();
    assert_eq!(results[0]["success"], true);
    assert_eq!(results[1]["success"], false);
    assert_eq!(results[2]["success"], false);
    assert_eq!(table_names(&h), BTreeSet::from(["kept".to_string()]));
}

#[tokio::test]
async fn test_batch_with_rejected_entry_still_succeeds() {
    let h = harness().await;
    let result = h
        .registry
        .execute(
            &ctx(),
            "batch",
            json!({"tool_calls": [
                {"tool": "create_table", "parameters": tasks_table("alpha")},
                {"tool": "batch", "parameters": {"tool_calls": []}}
            ]}),
        )
        .await;

    assert!(result.success, "{result:?}");
    assert!(!result.observation().starts_with("Error:"));
    let data = result.data.unwrap();
    assert_eq!(data["results"][0]["success"], true);
    assert_eq!(data["results"][1]["success"], false);
    assert!(table_names(&h).contains("alpha"));
}

#[tokio::test]
async fn test_batch_caps_executed_calls() {
    let h = harness().await;
    for requested in [3usize, 25, 27] {
        let calls: Vec<Value> = (0..requested)
            .map(|_| json!({"tool": "get_block_spec", "parameters": {"block_type": "hero"}}))
            .collect();
        let result = h
            .registry
            .execute(&ctx(), "batch", json!({"tool_calls": calls}))
            .await;
        let data = result.data.unwrap();
        assert_eq!(data["executed"], requested.min(25));
        assert_eq!(data["discarded"], requested.saturating_sub(25));
        assert_eq!(data["failed"], requested.saturating_sub(25));
        assert!(result.success);
    }
}

#[tokio::test]
async fn test_persona_filter_blocks_unlisted_tools() {
    let h = harness().await;
    h.registry.execute(&ctx(), "create_table", tasks_table("tasks")).await;
    let persona = h
        .deps
        .personas
        .register_custom(CreatePersonaRequest {
            name: "Reader".into(),
            description: String::new(),
            role_prompt: "Answer questions about tasks.".into(),
            allowed_actions: vec!["query".into()],
            suggestions: vec![],
            id: None,
        })
        .unwrap();
    let staff = ctx().with_persona(&persona);

    let denied = h
        .registry
        .execute(
            &staff,
            "insert_data",
            json!({"table_name": "tasks", "rows": [{"title": "sneaky"}]}),
        )
        .await;
    assert!(!denied.success);
    assert_eq!(denied.error.as_deref(), Some("tool not allowed by persona"));
    assert_eq!(denied.error_kind, Some(ToolErrorKind::PersonaDenied));

    let count = h
        .registry
        .execute(&staff, "query_data", json!({"sql": "SELECT COUNT(*) AS n FROM tasks"}))
        .await;
    assert!(count.success, "{count:?}");
    assert_eq!(count.data.unwrap()["rows"][0]["n"], 0);
}

#[tokio::test]
async fn test_column_types_are_case_insensitive() {
    let h = harness().await;
    let mixed = h
        .registry
        .execute(
            &ctx(),
            "create_table",
            json!({"name": "mixed", "columns": [
                {"name": "id", "type": "Integer", "primary_key": true},
                {"name": "label", "type": "Text"},
                {"name": "seen", "type": "Boolean"}
            ]}),
        )
        .await;
    assert!(mixed.success, "{mixed:?}");
    assert!(table_names(&h).contains("mixed"));

    let unknown = h
        .registry
        .execute(
            &ctx(),
            "create_table",
            json!({"name": "odd", "columns": [{"name": "id", "type": "VARCHAR"}]}),
        )
        .await;
    assert!(!unknown.success);
    assert_eq!(unknown.error_kind, Some(ToolErrorKind::InvalidParameters));
    let observation = unknown.observation();
    assert!(observation.contains("unknown type \"VARCHAR\""), "{observation}");
    assert!(observation.contains("accepted: TEXT"), "{observation}");
}

#[tokio::test]
async fn test_invalid_arguments_are_soft_failures() {
    let h = harness().await;
    let bad_json = h.registry.execute_raw(&ctx(), "create_table", "{not json").await;
    assert_eq!(bad_json.error_kind, Some(ToolErrorKind::InvalidParameters));

    let schema_mismatch = h
        .registry
        .execute(&ctx(), "create_table", json!({"name": "t"}))
        .await;
    assert!(
        schema_mismatch
            .error
            .as_deref()
            .unwrap()
            .starts_with("invalid parameters:")
    );

    let unknown = h.registry.execute(&ctx(), "launch_rocket", json!({})).await;
    assert_eq!(unknown.error_kind, Some(ToolErrorKind::UnknownTool));
}

#[tokio::test]
async fn test_add_then_remove_page_restores_page_ids() {
    let h = harness().await;
    let schema = json!({
        "app_schema_version": "2.0.0",
        "app_name": "Tasks",
        "default_page": "home",
        "navigation": {"type": "sidebar", "items": [{"page_id": "home", "label": "Home"}]},
        "pages": [{"id": "home", "title": "Home", "route": "/", "blocks": [
            {"id": "intro", "type": "markdown", "config": {"content": "# Tasks"}}
        ]}]
    });
    let generated = h
        .registry
        .execute(&ctx(), "generate_ui_schema", json!({"ui_schema": schema}))
        .await;
    assert!(generated.success, "{generated:?}");

    let before = current_schema(&h).await;
    let added = h
        .registry
        .execute(
            &ctx(),
            "modify_ui_schema",
            json!({"operations": [{"op": "add_page", "page": {
                "id": "report", "title": "Report", "route": "/report", "blocks": []
            }}]}),
        )
        .await;
    assert!(added.success, "{added:?}");
    assert!(page_ids(&current_schema(&h).await).contains(&"report".to_string()));

    let removed = h
        .registry
        .execute(
            &ctx(),
            "modify_ui_schema",
            json!({"operations": [{"op": "remove_page", "page_id": "report"}]}),
        )
        .await;
    assert!(removed.success, "{removed:?}");
    assert_eq!(page_ids(&current_schema(&h).await), page_ids(&before));
}

async fn current_schema(h: &Harness) -> Value {
    h.deps
        .workspaces
        .current_version("ws1")
        .await
        .unwrap()
        .and_then(|v| v.ui_schema)
        .unwrap()
}

#[tokio::test]
async fn test_attempt_completion_gates_on_missing_table() {
    let h = harness().await;
    let schema = json!({
        "app_name": "HR",
        "default_page": "staff",
        "navigation": {"items": [{"page_id": "staff", "label": "Staff"}]},
        "pages": [{"id": "staff", "title": "Staff", "route": "/", "blocks": [
            {"id": "list", "type": "data_table", "config": {"columns": []}, "data_source": {"table": "employees"}}
        ]}]
    });
    h.registry
        .execute(&ctx(), "generate_ui_schema", json!({"ui_schema": schema}))
        .await;

    let failed = h
        .registry
        .execute(&ctx(), "attempt_completion", json!({"summary": "HR app"}))
        .await;
    assert!(!failed.success);
    assert_eq!(failed.error_kind, Some(ToolErrorKind::ValidationFailed));
    assert!(
        failed
            .output
            .contains("MISSING_TABLE: Block references table \"employees\"")
    );

    h.registry
        .execute(
            &ctx(),
            "create_table",
            json!({"name": "employees", "columns": [
                {"name": "id", "type": "INTEGER", "primary_key": true},
                {"name": "name", "type": "TEXT"}
            ]}),
        )
        .await;
    let inserted = h
        .registry
        .execute(
            &ctx(),
            "insert_data",
            json!({"table_name": "employees", "rows": [{"name": "Ada"}, {"name": "Linus"}]}),
        )
        .await;
    assert!(inserted.success, "{inserted:?}");

    let passed = h
        .registry
        .execute(&ctx(), "attempt_completion", json!({"summary": "HR app"}))
        .await;
    assert!(passed.success, "{passed:?}");
}

#[tokio::test]
async fn test_deploy_logic_yields_fresh_vm() {
    let h = harness().await;
    let mut seen = Vec::new();
    for reply in ["one", "two"] {
        let code = format!("exports.routes = {{ 'GET /v': () => '{reply}' }};");
        let result = h
            .registry
            .execute(&ctx(), "deploy_logic", json!({"code": code}))
            .await;
        assert!(result.success, "{result:?}");
        let instance = h.deps.vm_pool.get_or_create("ws1").await.unwrap();
        seen.push(instance.id().to_string());
    }
    assert_ne!(seen[0], seen[1]);
}

#[tokio::test]
async fn test_plan_completes_only_when_in_progress() {
    let h = harness().await;
    let steps = json!({
        "title": "Employee App",
        "steps": [
            {"id": "s1", "description": "Create employees", "tool": "create_table"},
            {"id": "s2", "description": "Seed employees", "tool": "insert_data"},
            {"id": "s3", "description": "Build UI", "tool": "generate_ui_schema"}
        ]
    });

    // Draft plan: steps reach terminal states but nothing completes.
    let draft_session = Arc::new(Session::new("s-draft", "ws1", "u1", "app_builder"));
    let draft_ctx = ctx().with_session(Arc::clone(&draft_session));
    h.registry.execute(&draft_ctx, "create_plan", steps.clone()).await;
    for step in ["s1", "s2", "s3"] {
        let r = h
            .registry
            .execute(&draft_ctx, "update_plan", json!({"step_id": step, "status": "completed"}))
            .await;
        assert!(r.success, "{r:?}");
    }
    assert_eq!(draft_session.plan().unwrap().status, PlanStatus::Draft);
    assert_eq!(draft_session.phase(), SessionPhase::Planning);

    // Confirmed and executing: the last completed step finishes the session.
    let session = Arc::new(Session::new("s-live", "ws1", "u1", "app_builder"));
    let live_ctx = ctx().with_session(Arc::clone(&session));
    h.registry.execute(&live_ctx, "create_plan", steps).await;
    assert_eq!(session.plan().unwrap().status, PlanStatus::Draft);
    session.confirm_plan().unwrap();
    assert_eq!(session.phase(), SessionPhase::Confirmed);
    session.start_execution();
    assert_eq!(session.phase(), SessionPhase::Executing);

    for step in ["s1", "s2", "s3"] {
        h.registry
            .execute(&live_ctx, "update_plan", json!({"step_id": step, "status": "in_progress"}))
            .await;
        h.registry
            .execute(&live_ctx, "update_plan", json!({"step_id": step, "status": "completed"}))
            .await;
    }
    assert_eq!(session.plan().unwrap().status, PlanStatus::Completed);
    assert_eq!(session.phase(), SessionPhase::Completed);
}
