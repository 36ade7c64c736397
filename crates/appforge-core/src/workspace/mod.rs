//! Workspace domain module.
//!
//! - `model`: `Workspace`, `WorkspaceVersion`, `VersionDraft`, pagination
//! - `store`: `WorkspaceStore` trait consumed by the agent tools

mod model;
mod store;

pub use model::{
    AppStatus, ComponentCode, Page, PageRequest, VersionDraft, Workspace, WorkspaceVersion,
};
pub use store::WorkspaceStore;
