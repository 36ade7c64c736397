//! Folding old history into a digest.
//!
//! Long sessions keep their recent messages verbatim and replace everything
//! older with a `HistoryDigest`: the user requests seen so far, how often each
//! tool ran and failed, and the last thing the assistant said. Prompt
//! composition renders the digest, so the LLM still knows what happened.

use std::collections::BTreeMap;

use appforge_core::session::{ChatMessage, MessageRole};

const MAX_REQUESTS: usize = 8;
const CLIP_CHARS: usize = 200;

/// Calls and failures of one tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolTally {
    pub calls: usize,
    pub failed: usize,
}

/// What the folded part of a conversation contained.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryDigest {
    pub folded_messages: usize,
    /// Most recent folded user requests, oldest first
    pub requests: Vec<String>,
    pub tools: BTreeMap<String, ToolTally>,
    pub last_reply: Option<String>,
}

/// Outcome of `Session::compact_history`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compaction {
    pub folded: usize,
    pub kept: usize,
}

impl HistoryDigest {
    pub fn is_empty(&self) -> bool {
        self.folded_messages == 0
    }

    /// Adds `messages` to the digest.
    pub fn absorb(&mut self, messages: &[ChatMessage]) {
        for message in messages {
            match message.role {
                MessageRole::User => self.requests.push(clip(&message.content)),
                MessageRole::Assistant if !message.content.trim().is_empty() => {
                    self.last_reply = Some(clip(&message.content));
                }
                MessageRole::Tool => {
                    let name = message.tool_name.clone().unwrap_or_default();
                    let tally = self.tools.entry(name).or_default();
                    tally.calls += 1;
                    if message.content.starts_with("Error:") {
                        tally.failed += 1;
                    }
                }
                _ => {}
            }
        }
        if self.requests.len() > MAX_REQUESTS {
            let excess = self.requests.len() - MAX_REQUESTS;
            self.requests.drain(..excess);
        }
        self.folded_messages += messages.len();
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} earlier messages were folded.", self.folded_messages);
        if !self.requests.is_empty() {
            out.push_str("\nEarlier requests:");
            for request in &self.requests {
                out.push_str(&format!("\n- {request}"));
            }
        }
        if !self.tools.is_empty() {
            let tools: Vec<String> = self
                .tools
                .iter()
                .map(|(name, tally)| match tally.failed {
                    0 => format!("{name} x{}", tally.calls),
                    failed => format!("{name} x{} ({failed} failed)", tally.calls),
                })
                .collect();
            out.push_str(&format!("\nTool calls: {}", tools.join(", ")));
        }
        if let Some(reply) = &self.last_reply {
            out.push_str(&format!("\nLast reply: {reply}"));
        }
        out
    }
}

fn clip(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(CLIP_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Index at which `history` splits into a folded prefix and a kept suffix.
///
/// The suffix never starts with a tool result, so no result loses its call.
/// `None` when nothing would be folded.
pub(super) fn fold_point(history: &[ChatMessage], keep_recent: usize) -> Option<usize> {
    let mut cut = history.len().checked_sub(keep_recent.max(1))?;
    while cut > 0 && history[cut].role == MessageRole::Tool {
        cut -= 1;
    }
    (cut > 0).then_some(cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::session::ToolCallRequest;

    fn exchange(history: &mut Vec<ChatMessage>, id: &str, tool: &str, content: &str) {
        history.push(ChatMessage::assistant(
            "",
            vec![ToolCallRequest::new(id, tool, "{}")],
        ));
        history.push(ChatMessage::tool(id, tool, content));
    }

    #[test]
    fn test_digest_counts_tools_and_failures() {
        let mut history = vec![ChatMessage::user("build a shop")];
        exchange(&mut history, "c1", "create_table", "Created table orders");
        exchange(&mut history, "c2", "create_table", "Error: table exists");
        exchange(&mut history, "c3", "insert_data", "Inserted 3 rows");
        history.push(ChatMessage::assistant("Tables are ready.", vec![]));

        let mut digest = HistoryDigest::default();
        digest.absorb(&history);
        assert_eq!(digest.folded_messages, 8);
        assert_eq!(digest.tools["create_table"], ToolTally { calls: 2, failed: 1 });

        let text = digest.render();
        assert!(text.contains("- build a shop"));
        assert!(text.contains("create_table x2 (1 failed), insert_data x1"));
        assert!(text.ends_with("Last reply: Tables are ready."));
    }

    #[test]
    fn test_fold_point_never_orphans_results() {
        let mut history = vec![ChatMessage::user("go")];
        for i in 0..4 {
            exchange(&mut history, &format!("c{i}"), "query_data", "ok");
        }
        // 9 messages; keeping 3 would start on a tool result, so the cut moves to its call.
        assert_eq!(fold_point(&history, 3), Some(5));
        assert_eq!(history[5].role, MessageRole::Assistant);
        assert_eq!(fold_point(&history, 20), None);
    }

    #[test]
    fn test_requests_are_bounded_and_clipped() {
        let mut digest = HistoryDigest::default();
        let requests: Vec<ChatMessage> = (0..12)
            .map(|i| ChatMessage::user(format!("request {i}")))
            .collect();
        digest.absorb(&requests);
        assert_eq!(digest.requests.len(), MAX_REQUESTS);
        assert_eq!(digest.requests[0], "request 4");

        digest.absorb(&[ChatMessage::user("y".repeat(500))]);
        let last = digest.requests.last().unwrap();
        assert_eq!(last.chars().count(), CLIP_CHARS + 3);
    }
}
