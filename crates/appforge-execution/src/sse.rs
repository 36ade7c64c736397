//! Server-sent-event framing of agent events.

use appforge_core::Result;
use appforge_core::event::AgentEvent;

/// Encodes one event as an SSE frame: `event: <type>\ndata: <json>\n\n`.
pub fn frame(event: &AgentEvent) -> Result<String> {
    let data = serde_json::to_string(event)?;
    Ok(format!("event: {}\ndata: {data}\n\n", event.event_type()))
}
