//! In-memory `WorkspaceStore`, used by tests and ephemeral runs.

use std::collections::HashMap;

use appforge_core::workspace::{
    Page, PageRequest, VersionDraft, Workspace, WorkspaceStore, WorkspaceVersion,
};
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::WorkspaceDocument;

#[derive(Default)]
pub struct InMemoryWorkspaceStore {
    documents: RwLock<HashMap<String, WorkspaceDocument>>,
}

impl InMemoryWorkspaceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryWorkspaceStore {
    async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace> {
        let mut docs = self.documents.write().await;
        if docs.contains_key(&workspace.id) {
            return Err(ForgeError::invalid_schema(format!(
                "workspace {} already exists",
                workspace.id
            )));
        }
        docs.insert(workspace.id.clone(), WorkspaceDocument::new(workspace.clone()));
        Ok(workspace)
    }

    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        let docs = self.documents.read().await;
        Ok(docs.get(workspace_id).map(|d| d.workspace.clone()))
    }

    async fn list_workspaces(&self, page: PageRequest) -> Result<Page<Workspace>> {
        let docs = self.documents.read().await;
        let mut all: Vec<Workspace> = docs.values().map(|d| d.workspace.clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(page.slice(&all))
    }

    async fn current_version(&self, workspace_id: &str) -> Result<Option<WorkspaceVersion>> {
        let docs = self.documents.read().await;
        Ok(docs
            .get(workspace_id)
            .and_then(|d| d.current_version().cloned()))
    }

    async fn get_version(&self, version_id: &str) -> Result<Option<WorkspaceVersion>> {
        let docs = self.documents.read().await;
        Ok(docs
            .values()
            .flat_map(|d| d.versions.iter())
            .find(|v| v.id == version_id)
            .cloned())
    }

    async fn list_versions(
        &self,
        workspace_id: &str,
        page: PageRequest,
    ) -> Result<Page<WorkspaceVersion>> {
        let docs = self.documents.read().await;
        let doc = docs
            .get(workspace_id)
            .ok_or_else(|| ForgeError::not_found("workspace", workspace_id))?;
        Ok(page.slice(&doc.versions_newest_first()))
    }

    async fn create_version(
        &self,
        workspace_id: &str,
        user_id: &str,
        draft: VersionDraft,
    ) -> Result<WorkspaceVersion> {
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(workspace_id)
            .ok_or_else(|| ForgeError::not_found("workspace", workspace_id))?;
        Ok(doc.append_version(user_id, draft))
    }

    async fn publish(&self, workspace_id: &str, _user_id: &str) -> Result<Workspace> {
        let mut docs = self.documents.write().await;
        let doc = docs
            .get_mut(workspace_id)
            .ok_or_else(|| ForgeError::not_found("workspace", workspace_id))?;
        doc.publish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versions_are_append_only() {
        let store = InMemoryWorkspaceStore::new();
        store
            .create_workspace(Workspace::new("ws", "Demo", "u1"))
            .await
            .unwrap();
        assert!(store.current_version("ws").await.unwrap().is_none());

        let v1 = store.update_logic_code("ws", "u1", "a").await.unwrap();
        let v2 = store.update_logic_code("ws", "u1", "b").await.unwrap();

        let current = store.current_version("ws").await.unwrap().unwrap();
        assert_eq!(current.id, v2.id);
        assert_eq!(store.get_version(&v1.id).await.unwrap().unwrap().logic_code, "a");

        let page = store.list_versions("ws", PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.items[0].id, v2.id);
    }

    #[tokio::test]
    async fn test_missing_workspace() {
        let store = InMemoryWorkspaceStore::new();
        let err = store.update_logic_code("nope", "u", "x").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(!store.exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_workspace_rejected() {
        let store = InMemoryWorkspaceStore::new();
        store.create_workspace(Workspace::new("ws", "A", "u")).await.unwrap();
        assert!(store.create_workspace(Workspace::new("ws", "B", "u")).await.is_err());
    }
}
