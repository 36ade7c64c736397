//! OpenAI-compatible chat-completions client with streamed tool calls.
//!
//! Works against any endpoint that speaks the `/chat/completions` SSE protocol
//! (OpenAI, Azure-style proxies, local servers).

use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::time::Duration;

use appforge_core::config::LlmConfig;
use appforge_core::session::{ChatMessage, MessageRole, ToolCallRequest};
use appforge_core::{ForgeError, Result};
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::llm::{LlmChunk, LlmClient, LlmRequest, LlmStream};

/// Client for an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, model: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
        }
    }

    /// Builds a client from the `llm` config section.
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be constructed.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ForgeError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system_prompt }));
        }
        messages.extend(request.messages.iter().map(wire_message));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "temperature": request.temperature.unwrap_or(self.temperature),
            "max_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

fn wire_message(message: &ChatMessage) -> Value {
    match message.role {
        MessageRole::System => json!({ "role": "system", "content": message.content }),
        MessageRole::User => json!({ "role": "user", "content": message.content }),
        MessageRole::Assistant => {
            let mut value = json!({ "role": "assistant", "content": message.content });
            if message.has_tool_calls() {
                value["tool_calls"] = message
                    .tool_calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": c.arguments },
                        })
                    })
                    .collect();
            }
            value
        }
        MessageRole::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id,
            "content": message.content,
        }),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream(&self, request: LlmRequest) -> Result<LlmStream> {
        let body = self.build_body(&request);
        debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "[LLM] Sending streamed completion request"
        );

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|err| {
            ForgeError::llm(
                format!("request failed: {err}"),
                err.is_connect() || err.is_timeout(),
            )
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(map_http_error(status, &text));
        }

        let bytes: ByteStream = Box::pin(response.bytes_stream().map(|r| r.map(|b| b.to_vec())));
        Ok(chunk_stream(bytes))
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

struct StreamState {
    bytes: ByteStream,
    parser: StreamParser,
    pending: VecDeque<LlmChunk>,
    finished: bool,
}

fn chunk_stream(bytes: ByteStream) -> LlmStream {
    let state = StreamState {
        bytes,
        parser: StreamParser::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(chunk) = st.pending.pop_front() {
                return Some((Ok(chunk), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(bytes)) => match st.parser.feed(&bytes) {
                    Ok(chunks) => {
                        st.pending.extend(chunks);
                        st.finished = st.parser.is_done();
                    }
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                },
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ForgeError::llm(format!("stream read failed: {e}"), true)), st));
                }
                None => {
                    st.pending.extend(st.parser.finish());
                    st.finished = true;
                }
            }
        }
    }))
}

// ============================================================================
// SSE payload parsing
// ============================================================================

#[derive(Deserialize)]
struct StreamPayload {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallDelta>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
    announced: bool,
}

/// Turns raw SSE bytes into `LlmChunk`s, assembling tool-call argument deltas.
#[derive(Default)]
pub struct StreamParser {
    buffer: Vec<u8>,
    calls: BTreeMap<usize, PartialCall>,
    done: bool,
}

impl StreamParser {
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes bytes; returns the chunks completed by them.
    ///
    /// # Errors
    ///
    /// Returns an LLM error for malformed payloads or provider error frames.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<LlmChunk>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.handle_line(line.trim_end_matches(['\r', '\n']), &mut out)?;
        }
        Ok(out)
    }

    /// Flushes state at end of stream.
    pub fn finish(&mut self) -> Vec<LlmChunk> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            if let Err(e) = self.handle_line(line.trim(), &mut out) {
                warn!(error = %e, "[LLM] Dropping trailing stream data");
            }
        }
        if !self.done {
            self.complete(None, &mut out);
        }
        out
    }

    fn handle_line(&mut self, line: &str, out: &mut Vec<LlmChunk>) -> Result<()> {
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim();
        if data.is_empty() || self.done {
            return Ok(());
        }
        if data == "[DONE]" {
            self.complete(None, out);
            return Ok(());
        }

        let payload: StreamPayload = serde_json::from_str(data)
            .map_err(|e| ForgeError::llm(format!("malformed stream payload: {e}"), false))?;
        if let Some(error) = payload.error {
            return Err(ForgeError::llm(error.message, false));
        }

        for choice in payload.choices {
            if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                out.push(LlmChunk::Text(text));
            }
            for delta in choice.delta.tool_calls {
                let call = self.calls.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    call.id = id;
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        call.name.push_str(&name);
                    }
                    if let Some(args) = function.arguments {
                        call.arguments.push_str(&args);
                    }
                }
                if !call.announced && !call.name.is_empty() {
                    call.announced = true;
                    out.push(LlmChunk::ToolCallStart {
                        index: delta.index,
                        id: call.id.clone(),
                        name: call.name.clone(),
                    });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.complete(Some(reason), out);
            }
        }
        Ok(())
    }

    fn complete(&mut self, finish_reason: Option<String>, out: &mut Vec<LlmChunk>) {
        for (index, call) in std::mem::take(&mut self.calls) {
            if call.name.is_empty() {
                continue;
            }
            out.push(LlmChunk::ToolCall {
                index,
                call: ToolCallRequest::new(call.id, call.name, call.arguments),
            });
        }
        out.push(LlmChunk::Done { finish_reason });
        self.done = true;
    }
}

fn map_http_error(status: StatusCode, body: &str) -> ForgeError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string());

    let retryable = matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    );
    ForgeError::llm(format!("HTTP {}: {message}", status.as_u16()), retryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::tool::ToolSchema;

    fn frame(v: Value) -> String {
        format!("data: {v}\n\n")
    }

    #[test]
    fn test_parser_assembles_split_tool_call() {
        let mut parser = StreamParser::default();
        let mut chunks = Vec::new();
        let stream = [
            frame(json!({"choices":[{"delta":{"content":"Creating "}}]})),
            frame(json!({"choices":[{"delta":{"content":"table"}}]})),
            frame(json!({"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"create_table","arguments":"{\"name\":"}}]}}]})),
            frame(json!({"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"tasks\"}"}}]}}]})),
            frame(json!({"choices":[{"delta":{},"finish_reason":"tool_calls"}]})),
            "data: [DONE]\n\n".to_string(),
        ]
        .concat();

        // Feed in awkward slices to exercise line buffering.
        for piece in stream.as_bytes().chunks(7) {
            chunks.extend(parser.feed(piece).unwrap());
        }
        chunks.extend(parser.finish());

        assert_eq!(chunks[0], LlmChunk::Text("Creating ".into()));
        assert_eq!(chunks[1], LlmChunk::Text("table".into()));
        assert_eq!(
            chunks[2],
            LlmChunk::ToolCallStart { index: 0, id: "call_1".into(), name: "create_table".into() }
        );
        assert_eq!(
            chunks[3],
            LlmChunk::ToolCall {
                index: 0,
                call: ToolCallRequest::new("call_1", "create_table", "{\"name\":\"tasks\"}"),
            }
        );
        assert_eq!(chunks[4], LlmChunk::Done { finish_reason: Some("tool_calls".into()) });
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn test_parser_finishes_without_done_marker() {
        let mut parser = StreamParser::default();
        let chunks = parser
            .feed(frame(json!({"choices":[{"delta":{"content":"hi"}}]})).as_bytes())
            .unwrap();
        assert_eq!(chunks, vec![LlmChunk::Text("hi".into())]);
        assert_eq!(parser.finish(), vec![LlmChunk::Done { finish_reason: None }]);
    }

    #[test]
    fn test_parser_surfaces_error_frames() {
        let mut parser = StreamParser::default();
        let err = parser
            .feed(frame(json!({"error":{"message":"context length exceeded"}})).as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("context length exceeded"));
    }

    #[test]
    fn test_http_error_retryability() {
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, r#"{"error":{"message":"slow down"}}"#);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow down"));
        assert!(!map_http_error(StatusCode::BAD_REQUEST, "bad").is_retryable());
    }

    #[test]
    fn test_request_body_shape() {
        let client = OpenAiClient::new("http://localhost:1234/v1/", None, "local-model");
        assert_eq!(client.endpoint(), "http://localhost:1234/v1/chat/completions");

        let request = LlmRequest::new(
            "system text",
            vec![
                ChatMessage::user("hello"),
                ChatMessage::assistant("", vec![ToolCallRequest::new("c1", "get_logic", "{}")]),
                ChatMessage::tool("c1", "get_logic", "code"),
            ],
        )
        .with_tools(vec![ToolSchema {
            name: "get_logic".into(),
            description: "Read logic".into(),
            parameters: json!({"type": "object"}),
        }]);
        let body = client.build_body(&request);

        assert_eq!(body["stream"], json!(true));
        assert_eq!(body["tool_choice"], json!("auto"));
        assert_eq!(body["messages"][0]["role"], json!("system"));
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["name"], json!("get_logic"));
        assert_eq!(body["messages"][3]["tool_call_id"], json!("c1"));
        assert_eq!(body["tools"][0]["type"], json!("function"));
    }
}
