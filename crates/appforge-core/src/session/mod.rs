//! Session domain types.
//!
//! # Module Structure
//!
//! - `message`: Conversation history entries (`ChatMessage`, `MessageRole`, `ToolCallRequest`)
//! - `phase`: Session lifecycle (`SessionPhase`)
//!
//! The mutable, lock-guarded `Session` itself lives in `appforge-application`.

mod message;
mod phase;

pub use message::{ChatMessage, MessageRole, ToolCallRequest};
pub use phase::SessionPhase;
