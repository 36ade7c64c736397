//! The LLM boundary: a streaming chat-completions client abstraction.

use std::pin::Pin;

use appforge_core::Result;
use appforge_core::session::{ChatMessage, ToolCallRequest};
use appforge_core::tool::ToolSchema;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::Serialize;

/// One completion request. The system prompt is sent ahead of `messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Incremental pieces of an assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmChunk {
    /// Assistant text delta
    Text(String),
    /// A tool call was announced; arguments are still streaming.
    /// `id` is empty when the provider did not supply one.
    ToolCallStart { index: usize, id: String, name: String },
    /// A tool call is complete
    ToolCall { index: usize, call: ToolCallRequest },
    Done { finish_reason: Option<String> },
}

pub type LlmStream = Pin<Box<dyn Stream<Item = Result<LlmChunk>> + Send>>;

/// A chat-completions provider that streams its reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider label for logs.
    fn name(&self) -> &str;

    /// Starts a streamed completion.
    ///
    /// # Errors
    ///
    /// Connection and HTTP-status failures are reported here; failures after the
    /// first chunk arrive as `Err` items on the stream.
    async fn stream(&self, request: LlmRequest) -> Result<LlmStream>;
}

/// A fully collected assistant reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmReply {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: Option<String>,
}

/// Drains a stream into a single reply.
pub async fn collect_reply(mut stream: LlmStream) -> Result<LlmReply> {
    let mut reply = LlmReply::default();
    while let Some(chunk) = stream.next().await {
        match chunk? {
            LlmChunk::Text(text) => reply.content.push_str(&text),
            LlmChunk::ToolCallStart { .. } => {}
            LlmChunk::ToolCall { call, .. } => reply.tool_calls.push(call),
            LlmChunk::Done { finish_reason } => {
                reply.finish_reason = finish_reason;
                break;
            }
        }
    }
    Ok(reply)
}
