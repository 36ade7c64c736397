//! LLM boundary for AppForge.
//!
//! - [`LlmClient`]: streaming chat-completions abstraction consumed by the engine
//! - [`OpenAiClient`]: OpenAI-compatible HTTP implementation
//! - [`RetryingLlmClient`]: bounded retry with exponential backoff
//! - [`ScriptedLlmClient`]: deterministic replay for tests and offline runs

pub mod llm;
pub mod openai_client;
pub mod retry;
pub mod scripted;

pub use llm::{LlmChunk, LlmClient, LlmReply, LlmRequest, LlmStream, collect_reply};
pub use openai_client::{OpenAiClient, StreamParser};
pub use retry::{RetryPolicy, RetryingLlmClient};
pub use scripted::{ScriptedLlmClient, ScriptedTurn};
