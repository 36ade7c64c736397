//! Turn execution for AppForge.
//!
//! - [`engine`]: the agent loop (`Engine::run`, `Engine::confirm`, sub-agents)
//! - [`event_stream`]: bounded, ordered event queue of one turn
//! - [`sse`]: SSE framing of agent events
//! - [`diagnostics`] / [`telemetry`]: tracing setup and the diagnostics channel
//! - [`bootstrap`]: builds the whole runtime from a `ForgeConfig`

pub mod bootstrap;
pub mod diagnostics;
pub mod engine;
pub mod event_stream;
pub mod sse;
pub mod telemetry;

pub use bootstrap::AppRuntime;
pub use diagnostics::{DiagnosticEvent, DiagnosticsLayer};
pub use engine::{Engine, EngineParts, RunRequest};
pub use event_stream::{EventSink, EventStream};
pub use telemetry::init_tracing;
