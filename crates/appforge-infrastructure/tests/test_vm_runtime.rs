use std::sync::Arc;

use appforge_core::config::VmConfig;
use appforge_core::workspace::{Workspace, WorkspaceStore};
use appforge_infrastructure::vm::{
    ColumnDef, CreateTableRequest, StoreCodeLoader, VmPool, VmRequest, VmStore,
};
use appforge_infrastructure::{ForgePaths, InMemoryWorkspaceStore, JsonFileWorkspaceStore};
use serde_json::json;
use tempfile::TempDir;

const TASKS_API: &str = r#"
exports.routes = {
  "GET /tasks": function (req) {
    return db.query("SELECT id, title FROM tasks ORDER BY id");
  },
  "POST /tasks": function (req) {
    var res = db.insert("tasks", { title: req.body.title });
    return { status: 201, body: { id: res.id } };
  }
};
"#;

fn tasks_table() -> CreateTableRequest {
    CreateTableRequest {
        name: "tasks".into(),
        columns: vec![
            ColumnDef::new("id", "INTEGER").primary(),
            ColumnDef::new("title", "TEXT").not_null(),
        ],
        primary_key: vec![],
        indexes: vec![],
    }
}

#[tokio::test]
async fn test_deployed_code_serves_requests_against_workspace_db() {
    let dir = TempDir::new().unwrap();
    let paths = ForgePaths::new(dir.path());
    let vm_store = Arc::new(VmStore::new(paths.vm_dir()));
    let workspaces: Arc<dyn WorkspaceStore> = Arc::new(InMemoryWorkspaceStore::new());
    workspaces
        .create_workspace(Workspace::new("ws", "Tasks", "u1"))
        .await
        .unwrap();
    vm_store.create_table("ws", &tasks_table()).unwrap();
    workspaces.update_logic_code("ws", "u1", TASKS_API).await.unwrap();

    let pool = VmPool::new(
        Arc::clone(&vm_store),
        Arc::new(StoreCodeLoader::new(Arc::clone(&workspaces))),
        VmConfig::default(),
    );
    let vm = pool.get_or_create("ws").await.unwrap();

    let created = vm.handle(&VmRequest::new("POST", "/tasks").with_body(json!({"title": "write docs"})));
    assert_eq!(created.status, 201);

    let listed = vm.handle(&VmRequest::new("GET", "/tasks"));
    assert_eq!(listed.status, 200);
    assert_eq!(listed.body, json!([{"id": 1, "title": "write docs"}]));
    assert!(dir.path().join("vm").join("ws.sqlite").exists());
}

#[tokio::test]
async fn test_redeploy_and_invalidate_changes_vm_identity() {
    let dir = TempDir::new().unwrap();
    let vm_store = Arc::new(VmStore::new(dir.path().join("vm")));
    let workspaces: Arc<dyn WorkspaceStore> =
        Arc::new(JsonFileWorkspaceStore::new(dir.path().join("workspaces")).unwrap());
    workspaces
        .create_workspace(Workspace::new("ws", "Demo", "u1"))
        .await
        .unwrap();

    let pool = VmPool::new(
        vm_store,
        Arc::new(StoreCodeLoader::new(Arc::clone(&workspaces))),
        VmConfig::default(),
    );

    // Nothing deployed yet: default VM with no routes.
    let empty = pool.get_or_create("ws").await.unwrap();
    assert!(empty.route_keys().is_empty());
    assert_eq!(empty.handle(&VmRequest::new("GET", "/")).status, 404);

    let mut seen = vec![empty.id().to_string()];
    for version in 1..=3 {
        let code = format!(r#"exports.routes = {{ "GET /v": function () {{ return {version}; }} }};"#);
        workspaces.update_logic_code("ws", "u1", &code).await.unwrap();
        pool.invalidate("ws");

        let vm = pool.get_or_create("ws").await.unwrap();
        assert!(!seen.contains(&vm.id().to_string()));
        assert_eq!(vm.handle(&VmRequest::new("GET", "/v")).body, json!(version));
        seen.push(vm.id().to_string());
    }
    assert_eq!(pool.stats().entries, 1);
}
