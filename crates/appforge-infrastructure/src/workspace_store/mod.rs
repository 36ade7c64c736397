//! `WorkspaceStore` implementations.
//!
//! Both stores keep one [`WorkspaceDocument`] per workspace: the workspace row
//! plus its append-only version list.

mod file;
mod memory;

pub use file::JsonFileWorkspaceStore;
pub use memory::InMemoryWorkspaceStore;

use appforge_core::workspace::{AppStatus, VersionDraft, Workspace, WorkspaceVersion};
use appforge_core::{ForgeError, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Persisted unit for a single workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceDocument {
    pub workspace: Workspace,
    /// Oldest first
    #[serde(default)]
    pub versions: Vec<WorkspaceVersion>,
}

impl WorkspaceDocument {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            versions: Vec::new(),
        }
    }

    pub fn current_version(&self) -> Option<&WorkspaceVersion> {
        let current = self.workspace.current_version_id.as_deref()?;
        self.versions.iter().find(|v| v.id == current)
    }

    /// Appends a version and advances `current_version_id`.
    pub fn append_version(&mut self, user_id: &str, draft: VersionDraft) -> WorkspaceVersion {
        let version = draft.apply(self.current_version(), &self.workspace.id, user_id);
        self.workspace.current_version_id = Some(version.id.clone());
        self.workspace.updated_at = version.created_at;
        self.versions.push(version.clone());
        version
    }

    pub fn publish(&mut self) -> Result<Workspace> {
        if self.workspace.current_version_id.is_none() {
            return Err(ForgeError::invalid_transition(format!(
                "workspace {} has no version to publish",
                self.workspace.id
            )));
        }
        let now = Utc::now();
        self.workspace.app_status = AppStatus::Published;
        self.workspace.published_at = Some(now);
        self.workspace.updated_at = now;
        Ok(self.workspace.clone())
    }

    /// Versions newest first.
    pub fn versions_newest_first(&self) -> Vec<WorkspaceVersion> {
        self.versions.iter().rev().cloned().collect()
    }
}
