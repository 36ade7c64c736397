//! Workspace store abstraction.

use async_trait::async_trait;

use super::model::{Page, PageRequest, VersionDraft, Workspace, WorkspaceVersion};
use crate::error::Result;

/// An abstract store for workspace metadata and versioned artifacts.
///
/// The agent engine depends only on this trait; the actual persistence mechanism
/// (memory, JSON documents, a relational database) is an infrastructure concern.
///
/// Versions are append-only. `create_version` must advance the workspace's
/// `current_version_id` atomically with the insert.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Creates a new workspace.
    ///
    /// # Arguments
    ///
    /// * `workspace` - The workspace to create. Its `id` must be unused.
    async fn create_workspace(&self, workspace: Workspace) -> Result<Workspace>;

    /// Retrieves a workspace by its ID.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(workspace))`: Workspace found
    /// - `Ok(None)`: Workspace not found
    /// - `Err(_)`: Error occurred during retrieval
    async fn get_workspace(&self, workspace_id: &str) -> Result<Option<Workspace>>;

    /// Lists workspaces ordered by creation time, newest first.
    async fn list_workspaces(&self, page: PageRequest) -> Result<Page<Workspace>>;

    /// Returns the version `current_version_id` points at, if any.
    async fn current_version(&self, workspace_id: &str) -> Result<Option<WorkspaceVersion>>;

    async fn get_version(&self, version_id: &str) -> Result<Option<WorkspaceVersion>>;

    /// Lists versions of a workspace, newest first.
    async fn list_versions(
        &self,
        workspace_id: &str,
        page: PageRequest,
    ) -> Result<Page<WorkspaceVersion>>;

    /// Appends a new version built from `draft` on top of the current one.
    ///
    /// # Arguments
    ///
    /// * `workspace_id` - Target workspace
    /// * `user_id` - Recorded as `created_by`
    /// * `draft` - Artifacts to change; unset fields are carried over
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the workspace does not exist.
    async fn create_version(
        &self,
        workspace_id: &str,
        user_id: &str,
        draft: VersionDraft,
    ) -> Result<WorkspaceVersion>;

    /// Marks the workspace as published.
    async fn publish(&self, workspace_id: &str, user_id: &str) -> Result<Workspace>;

    /// Stores new logic code as a fresh version.
    ///
    /// Default implementation delegates to `create_version`.
    async fn update_logic_code(
        &self,
        workspace_id: &str,
        user_id: &str,
        code: &str,
    ) -> Result<WorkspaceVersion> {
        self.create_version(workspace_id, user_id, VersionDraft::logic_code(code))
            .await
    }

    /// Checks if a workspace exists.
    ///
    /// Default implementation uses `get_workspace`.
    async fn exists(&self, workspace_id: &str) -> Result<bool> {
        Ok(self.get_workspace(workspace_id).await?.is_some())
    }
}
