//! Agent event stream frames.
//!
//! One `AgentEvent` is one frame of a turn's output. The `type` tag doubles as the
//! SSE event name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;

use crate::plan::Plan;
use crate::session::SessionPhase;

/// Stable, provider-independent classes of engine-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    LlmError,
    ToolError,
    StepLimitExceeded,
    Cancelled,
    SessionBusy,
    Internal,
}

/// Why a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DoneReason {
    /// `attempt_completion` succeeded
    AttemptCompletion,
    /// The assistant replied without requesting tools
    EndTurn,
    StepLimit,
    /// A tool needs explicit user approval before it runs
    AwaitingConfirmation,
    Error,
    Cancelled,
}

/// Event payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Message {
        content: String,
    },
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        success: bool,
        output: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        affected_resource: Option<String>,
    },
    PlanUpdate {
        plan: Plan,
    },
    PhaseChange {
        from: SessionPhase,
        to: SessionPhase,
    },
    ConfirmationRequired {
        action_id: String,
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
    Done {
        reason: DoneReason,
    },
}

impl EventPayload {
    /// The SSE event name for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::Message { .. } => "message",
            EventPayload::ToolCallStart { .. } => "tool_call_start",
            EventPayload::ToolCall { .. } => "tool_call",
            EventPayload::ToolResult { .. } => "tool_result",
            EventPayload::PlanUpdate { .. } => "plan_update",
            EventPayload::PhaseChange { .. } => "phase_change",
            EventPayload::ConfirmationRequired { .. } => "confirmation_required",
            EventPayload::Error { .. } => "error",
            EventPayload::Done { .. } => "done",
        }
    }
}

/// A frame of the output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl AgentEvent {
    pub fn new(session_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    /// Assistant text frames may be dropped under backpressure; nothing else may.
    pub fn is_droppable(&self) -> bool {
        matches!(self.payload, EventPayload::Message { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self.payload, EventPayload::Done { .. })
    }

    /// The tool call id carried by tool frames, if any.
    pub fn tool_call_id(&self) -> Option<&str> {
        match &self.payload {
            EventPayload::ToolCallStart { tool_call_id, .. }
            | EventPayload::ToolCall { tool_call_id, .. }
            | EventPayload::ToolResult { tool_call_id, .. }
            | EventPayload::ConfirmationRequired { tool_call_id, .. } => Some(tool_call_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_flat_with_type_tag() {
        let event = AgentEvent::new(
            "s1",
            EventPayload::Done {
                reason: DoneReason::AttemptCompletion,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["reason"], "attempt_completion");
        assert_eq!(json["session_id"], "s1");
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_phase_change_wire_names() {
        let event = AgentEvent::new(
            "s1",
            EventPayload::PhaseChange {
                from: SessionPhase::Confirmed,
                to: SessionPhase::Executing,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from"], "confirmed");
        assert_eq!(json["to"], "executing");
    }

    #[test]
    fn test_only_messages_are_droppable() {
        let msg = AgentEvent::new("s", EventPayload::Message { content: "hi".into() });
        let err = AgentEvent::new(
            "s",
            EventPayload::Error {
                kind: ErrorKind::Internal,
                message: "x".into(),
            },
        );
        assert!(msg.is_droppable());
        assert!(!err.is_droppable());
        assert_eq!(ErrorKind::StepLimitExceeded.to_string(), "step_limit_exceeded");
    }
}
