//! Source of deployed logic code for the VM pool.

use std::sync::Arc;

use appforge_core::Result;
use appforge_core::workspace::WorkspaceStore;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Deployed code together with its content digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedCode {
    pub code: String,
    /// SHA-256 hex digest of `code`; empty when nothing is deployed
    pub hash: String,
}

impl LoadedCode {
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let hash = code_hash(&code);
        Self { code, hash }
    }
}

/// SHA-256 hex digest of a script. Empty code hashes to the empty string.
pub fn code_hash(code: &str) -> String {
    if code.is_empty() {
        return String::new();
    }
    hex::encode(Sha256::digest(code.as_bytes()))
}

/// Resolves the currently deployed code of a workspace.
///
/// Decouples `VmPool` from `WorkspaceStore` so the pool is testable on its own.
#[async_trait]
pub trait VmCodeLoader: Send + Sync {
    async fn load_code(&self, workspace_id: &str) -> Result<LoadedCode>;
}

/// Loads logic code from the workspace's current version.
pub struct StoreCodeLoader {
    store: Arc<dyn WorkspaceStore>,
}

impl StoreCodeLoader {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VmCodeLoader for StoreCodeLoader {
    async fn load_code(&self, workspace_id: &str) -> Result<LoadedCode> {
        let code = self
            .store
            .current_version(workspace_id)
            .await?
            .map(|v| v.logic_code)
            .unwrap_or_default();
        Ok(LoadedCode::new(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_hash_is_stable_sha256() {
        assert_eq!(
            code_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(code_hash(""), "");
        assert_ne!(code_hash("a"), code_hash("b"));
    }
}
