//! A deterministic `LlmClient` that replays predetermined assistant turns.
//!
//! Used by engine tests and by the CLI's offline mode. Every request is
//! recorded so tests can assert on prompts and advertised tools.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use appforge_core::session::ToolCallRequest;
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use futures::stream;
use serde_json::Value;

use crate::llm::{LlmChunk, LlmClient, LlmRequest, LlmStream};

/// One scripted assistant reply.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Returned from `stream` instead of a reply
    pub error: Option<ForgeError>,
    /// Waited before the reply starts
    pub delay: Option<Duration>,
}

impl ScriptedTurn {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// A turn with a single tool call and no provider id.
    pub fn tool(name: impl Into<String>, arguments: Value) -> Self {
        Self::default().with_tool(name, arguments)
    }

    pub fn error(error: ForgeError) -> Self {
        Self {
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls
            .push(ToolCallRequest::new("", name, arguments.to_string()));
        self
    }

    pub fn with_tool_id(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        self.tool_calls
            .push(ToolCallRequest::new(id, name, arguments.to_string()));
        self
    }

    /// Raw, possibly malformed, argument text.
    pub fn with_raw_tool(mut self, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        self.tool_calls.push(ToolCallRequest::new("", name, arguments));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn into_chunks(self) -> Vec<Result<LlmChunk>> {
        let mut chunks = Vec::new();
        if !self.text.is_empty() {
            chunks.push(Ok(LlmChunk::Text(self.text)));
        }
        let finish_reason = if self.tool_calls.is_empty() {
            "stop"
        } else {
            "tool_calls"
        };
        for (index, call) in self.tool_calls.into_iter().enumerate() {
            chunks.push(Ok(LlmChunk::ToolCallStart {
                index,
                id: call.id.clone(),
                name: call.name.clone(),
            }));
            chunks.push(Ok(LlmChunk::ToolCall { index, call }));
        }
        chunks.push(Ok(LlmChunk::Done {
            finish_reason: Some(finish_reason.to_string()),
        }));
        chunks
    }
}

/// Replays `ScriptedTurn`s in order. Once exhausted, every reply is empty.
#[derive(Default)]
pub struct ScriptedLlmClient {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<LlmRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedLlmClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, turn: ScriptedTurn) {
        lock(&self.turns).push_back(turn);
    }

    pub fn remaining(&self) -> usize {
        lock(&self.turns).len()
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: LlmRequest) -> Result<LlmStream> {
        lock(&self.requests).push(request);
        let turn = lock(&self.turns).pop_front().unwrap_or_default();
        if let Some(delay) = turn.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = turn.error {
            return Err(err);
        }
        Ok(Box::pin(stream::iter(turn.into_chunks())))
    }
}
