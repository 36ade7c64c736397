//! Unified path management for AppForge state.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/appforge/          # Config directory
//! └── config.toml              # ForgeConfig
//!
//! ~/.local/share/appforge/     # Data root (overridable via `data_root`)
//! ├── vm/                      # <workspace_id>.sqlite per workspace
//! └── workspaces/              # <workspace_id>.json per workspace
//! ```

use std::path::{Path, PathBuf};

use appforge_core::{ForgeError, Result};

const APP_DIR: &str = "appforge";

/// Resolved locations for one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgePaths {
    data_root: PathBuf,
}

impl ForgePaths {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    /// Uses `data_root` when given, otherwise the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns a config error when no platform data directory can be determined.
    pub fn resolve(data_root: Option<&Path>) -> Result<Self> {
        match data_root {
            Some(root) => Ok(Self::new(root)),
            None => Ok(Self::new(Self::default_data_dir()?)),
        }
    }

    /// Returns the platform config directory (e.g. `~/.config/appforge/`).
    pub fn config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR))
            .ok_or_else(|| ForgeError::config("cannot determine config directory"))
    }

    /// Returns the path to the main configuration file.
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Returns the platform data directory (e.g. `~/.local/share/appforge/`).
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .ok_or_else(|| ForgeError::config("cannot determine data directory"))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Directory holding per-workspace SQLite files.
    pub fn vm_dir(&self) -> PathBuf {
        self.data_root.join("vm")
    }

    /// Directory holding workspace JSON documents.
    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_root.join("workspaces")
    }

    /// Creates every directory under the data root.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.vm_dir())?;
        std::fs::create_dir_all(self.workspaces_dir())?;
        Ok(())
    }
}
