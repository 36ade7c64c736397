//! JSON-file `WorkspaceStore`: one document per workspace under a directory.
//!
//! ```text
//! <root>/
//! ├── <workspace_id>.json
//! └── <workspace_id>.json
//! ```

use std::path::{Path, PathBuf};

use appforge_core::workspace::{
    Page, PageRequest, VersionDraft, Workspace, WorkspaceStore, WorkspaceVersion,
};
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::WorkspaceDocument;
use crate::storage::AtomicJsonFile;
use crate::vm::validate_workspace_id;

pub struct JsonFileWorkspaceStore {
    root: PathBuf,
    /// Serializes read-modify-write cycles across workspaces
    write_lock: Mutex<()>,
}

impl JsonFileWorkspaceStore {
    /// Creates the store, creating `root` if needed.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file(&self, workspace_id: &str) -> Result<AtomicJsonFile<WorkspaceDocument>> {
        validate_workspace_id(workspace_id)?;
        Ok(AtomicJsonFile::new(self.root.join(format!("{workspace_id}.json"))))
    }

    fn load(&self, workspace_id: &str) -> Result<Option<WorkspaceDocument>> {
        self.file(workspace_id)?.load()
    }

    fn load_required(&self, workspace_id: &str) -> Result<WorkspaceDocument> {
        self.load(workspace_id)?
            .ok_or_else(|| ForgeError::not_found("workspace", workspace_id))
    }

    fn save(&self, doc: &WorkspaceDocument) -> Result<()> {
        self.file(&doc.workspace.id)?.save(doc)?;
        debug!(workspace_id = %doc.workspace.id, "[WorkspaceStore] Saved document");
        Ok(())
    }

    /// Loads every parseable document; corrupt files are skipped with a warning.
    fn load_all(&self) -> Result<Vec<WorkspaceDocument>> {
        let mut docs = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match AtomicJsonFile::<WorkspaceDocument>::new(&path).load() {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => warn!(path = ?path, error = %e, "[WorkspaceStore] Skipping unreadable document"),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl WorkspaceStore for JsonFileWorkspaceStore {
    async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace> {
        let _guard = self.write_lock.lock().await;
        if self.load(&workspace.id)?.is_some() {
            return Err(ForgeError::invalid_schema(format!(
                "workspace {} already exists",
                workspace.id
            )));
        }
        self.save(&WorkspaceDocument::new(workspace.clone()))?;
        Ok(workspace)
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        Ok(self.load(workspace_id)?.map(|d| d.workspace))
    }

    async fn list_workspaces(&self, page: PageRequest) -> Result<Page<Workspace>> {
        let mut all: Vec<Workspace> = self.load_all()?.into_iter().map(|d| d.workspace).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(page.slice(&all))
    }

    async fn current_version(&self, workspace_id: &str) -> Result<Option<WorkspaceVersion>> {
        Ok(self
            .load(workspace_id)?
            .and_then(|d| d.current_version().cloned()))
    }

    async fn get_version(&self, version_id: &str) -> Result<Option<WorkspaceVersion>> {
        Ok(self
            .load_all()?
            .into_iter()
            .flat_map(|d| d.versions)
            .find(|v| v.id == version_id))
    }

    async fn list_versions(
        &self,
        workspace_id: &str,
        page: PageRequest,
    ) -> Result<Page<WorkspaceVersion>> {
        let doc = self.load_required(workspace_id)?;
        Ok(page.slice(&doc.versions_newest_first()))
    }

    async fn create_version(
        &self,
        workspace_id: &str,
        user_id: &str,
        draft: VersionDraft,
    ) -> Result<WorkspaceVersion> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_required(workspace_id)?;
        let version = doc.append_version(user_id, draft);
        self.save(&doc)?;
        Ok(version)
    }

    async fn publish(&self, workspace_id: &str, _user_id: &str) -> Result<Workspace> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.load_required(workspace_id)?;
        let workspace = doc.publish()?;
        self.save(&doc)?;
        Ok(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonFileWorkspaceStore::new(dir.path()).unwrap();
            store
                .create_workspace(Workspace::new("ws-1", "Demo", "u1"))
                .await
                .unwrap();
            store
                .create_version("ws-1", "u1", VersionDraft::ui_schema(json!({"app_name": "Demo"})))
                .await
                .unwrap();
        }

        let store = JsonFileWorkspaceStore::new(dir.path()).unwrap();
        let current = store.current_version("ws-1").await.unwrap().unwrap();
        assert_eq!(current.version_tag, "v1");
        assert_eq!(current.ui_schema, Some(json!({"app_name": "Demo"})));
        assert_eq!(store.list_workspaces(PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileWorkspaceStore::new(dir.path()).unwrap();
        assert!(store.get_workspace("../etc").await.is_err());
    }

    #[tokio::test]
    async fn test_publish_persists_status() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileWorkspaceStore::new(dir.path()).unwrap();
        store.create_workspace(Workspace::new("ws", "Demo", "u")).await.unwrap();
        store.update_logic_code("ws", "u", "exports.routes = {};").await.unwrap();
        store.publish("ws", "u").await.unwrap();
        let ws = store.get_workspace("ws").await.unwrap().unwrap();
        assert_eq!(ws.app_status.to_string(), "published");
    }
}
