//! Application layer for AppForge.
//!
//! Coordinates the domain model with the storage adapters: the persona
//! registry, resident sessions, the tool catalog and prompt composition. The
//! agent loop itself lives in `appforge-execution`.

pub mod complexity;
pub mod persona_registry;
pub mod prompt;
pub mod session;
pub mod tools;

pub use complexity::{RequestComplexity, classify_request};
pub use persona_registry::PersonaRegistry;
pub use prompt::{PLANNING_TOOLS, PromptContext, advertised_tools, build_system_prompt};
pub use session::{CancelOutcome, PendingAction, PhaseTransition, Session, SessionManager, SessionSummary};
pub use tools::{AgentRuntime, SubAgentOutcome, SubAgentRequest, Tool, ToolContext, ToolDeps, ToolRegistry, build_registry};
