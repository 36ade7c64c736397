//! Domain model for the AppForge agent engine.
//!
//! This crate holds the plain types shared by every layer (plans, personas,
//! events, tool results, workspaces) together with the collaborator traits the
//! engine consumes. It has no I/O of its own.

pub mod config;
pub mod error;
pub mod event;
pub mod persona;
pub mod plan;
pub mod session;
pub mod tool;
pub mod workspace;

pub use error::{ForgeError, Result};
