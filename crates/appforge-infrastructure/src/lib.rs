//! Storage and runtime adapters for AppForge.
//!
//! - [`vm`]: per-workspace SQLite (`VmStore`) and QuickJS runtimes (`VmPool`)
//! - [`workspace_store`]: `WorkspaceStore` implementations
//! - [`paths`] / [`config_loader`]: on-disk layout and configuration

pub mod config_loader;
pub mod paths;
pub mod storage;
pub mod vm;
pub mod workspace_store;

pub use config_loader::ConfigLoader;
pub use paths::ForgePaths;
pub use vm::{VmCodeLoader, VmInstance, VmPool, VmStore};
pub use workspace_store::{InMemoryWorkspaceStore, JsonFileWorkspaceStore};
