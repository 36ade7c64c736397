//! The agent turn loop.
//!
//! One `run` call drives one turn of a session: it streams LLM replies, runs the
//! requested tools one after another and feeds their observations back until
//! the model stops calling tools, `attempt_completion` succeeds, a destructive
//! call needs approval, or the step budget runs out. Everything the turn does is
//! reported on a single ordered `EventStream`.

use std::sync::{Arc, Weak};
use std::time::Duration;

use appforge_application::prompt::{PromptContext, advertised_tools, build_system_prompt};
use appforge_application::session::{CancelOutcome, PendingAction, PhaseTransition};
use appforge_application::tools::{
    AgentRuntime, SubAgentOutcome, SubAgentRequest, ToolContext, ToolRegistry,
};
use appforge_application::{PersonaRegistry, Session, SessionManager};
use appforge_core::config::EngineConfig;
use appforge_core::event::{DoneReason, ErrorKind, EventPayload};
use appforge_core::persona::Persona;
use appforge_core::session::{ChatMessage, ToolCallRequest};
use appforge_core::tool::{ToolErrorKind, ToolResult};
use appforge_core::{ForgeError, Result};
use appforge_interaction::{LlmChunk, LlmClient, LlmReply, LlmRequest};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::event_stream::{EventSink, EventStream, channel};

const ATTEMPT_COMPLETION: &str = "attempt_completion";
const PLAN_TOOLS: [&str; 2] = ["create_plan", "update_plan"];

/// Input of one turn.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub workspace_id: String,
    pub user_id: String,
    pub prompt: String,
    /// Continue this session; a new one is created when absent or unknown
    pub session_id: Option<String>,
    /// Switch the session to this persona before the turn
    pub persona_id: Option<String>,
}

/// Collaborators the engine is built from.
pub struct EngineParts {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Arc<ToolRegistry>,
    pub personas: Arc<PersonaRegistry>,
    pub sessions: Arc<SessionManager>,
    pub config: EngineConfig,
}

/// State of the turn being driven.
struct Turn {
    session: Arc<Session>,
    persona: Persona,
    depth: u32,
    cancel: CancellationToken,
}

/// Running totals reported to `task` callers.
#[derive(Debug, Default)]
struct TurnStats {
    steps: usize,
    tool_calls: usize,
    failed_tool_calls: usize,
    final_message: String,
}

/// What the loop should do after a batch of tool calls.
enum Flow {
    Continue,
    Finish(DoneReason),
}

/// How a turn ended.
enum TurnEnd {
    Done(DoneReason),
    Failed(ErrorKind, String, DoneReason),
}

pub struct Engine {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    personas: Arc<PersonaRegistry>,
    sessions: Arc<SessionManager>,
    config: EngineConfig,
    me: Weak<Engine>,
}

impl Engine {
    pub fn new(parts: EngineParts) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            llm: parts.llm,
            tools: parts.tools,
            personas: parts.personas,
            sessions: parts.sessions,
            config: parts.config,
            me: me.clone(),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    pub fn personas(&self) -> &Arc<PersonaRegistry> {
        &self.personas
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cancels a session.
    ///
    /// A running turn stops at its next suspension point and ends with
    /// `cancelled`; a held tool call is dropped; the session moves to `failed`.
    /// The next `run` on the session starts over in `planning`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown session.
    pub async fn cancel(&self, session_id: &str) -> Result<CancelOutcome> {
        let outcome = self.sessions.cancel(session_id).await?;
        if let Some(transition) = outcome.transition {
            info!(session_id, from = %transition.from, to = %transition.to, "[Engine] Session cancelled");
        }
        Ok(outcome)
    }

    // ============================================================================
    // Entry points
    // ============================================================================

    /// Starts a turn and returns its event stream.
    ///
    /// The turn runs on its own task; dropping the stream or cancelling `cancel`
    /// stops it at the next suspension point. The last frame is always `done`.
    pub fn run(&self, request: RunRequest, cancel: CancellationToken) -> EventStream {
        let (mut sink, stream) = channel(self.config.event_buffer, cancel.clone());
        let Some(engine) = self.me.upgrade() else {
            return stream;
        };
        if let Some(id) = &request.session_id {
            sink.set_session_id(id.clone());
        }
        let span = info_span!("turn", workspace_id = %request.workspace_id, user_id = %request.user_id);
        tokio::spawn(
            async move {
                let end = engine.start_turn(request, &mut sink, cancel).await;
                engine.finish(&sink, end).await;
            }
            .instrument(span),
        );
        stream
    }

    /// Resolves a held destructive tool call and continues the turn.
    ///
    /// An approved call runs; a rejected one is answered with an error
    /// observation. Either way the remaining calls of the same assistant reply run
    /// and the loop resumes.
    pub fn confirm(
        &self,
        session_id: &str,
        action_id: &str,
        approved: bool,
        cancel: CancellationToken,
    ) -> EventStream {
        let (mut sink, stream) = channel(self.config.event_buffer, cancel.clone());
        sink.set_session_id(session_id);
        let Some(engine) = self.me.upgrade() else {
            return stream;
        };
        let session_id = session_id.to_string();
        let action_id = action_id.to_string();
        let span = info_span!("confirm", session_id = %session_id, action_id = %action_id);
        tokio::spawn(
            async move {
                let end = engine
                    .resume_turn(&session_id, &action_id, approved, &sink, cancel)
                    .await;
                engine.finish(&sink, end).await;
            }
            .instrument(span),
        );
        stream
    }

    async fn start_turn(
        &self,
        request: RunRequest,
        sink: &mut EventSink,
        cancel: CancellationToken,
    ) -> TurnEnd {
        let persona_id = request
            .persona_id
            .clone()
            .unwrap_or_else(|| self.config.default_persona.clone());
        let session = match self
            .sessions
            .get_or_create(
                request.session_id.as_deref(),
                &request.workspace_id,
                &request.user_id,
                &persona_id,
            )
            .await
        {
            Ok(session) => session,
            Err(err) => return failed(err),
        };
        sink.set_session_id(session.id());

        let _guard = match session.begin_turn() {
            Ok(guard) => guard,
            Err(err) => return failed(err),
        };
        let cancel = session.bind_turn_cancel(&cancel);
        if request.persona_id.is_some() {
            session.set_persona_id(persona_id);
        }
        let persona = match self.personas.resolve(&session.persona_id()) {
            Ok(persona) => persona,
            Err(err) => return failed(err),
        };
        info!(
            session_id = session.id(),
            persona_id = %persona.id,
            phase = %session.phase(),
            "[Engine] Turn started"
        );

        if let Some(transition) = session.reopen_if_finished() {
            if let Err(err) = emit_transition(sink, transition).await {
                return failed(err);
            }
        }
        abandon_pending_action(&session);
        let closed = session.close_open_tool_calls("Error: not executed, the turn was interrupted");
        if closed > 0 {
            debug!(session_id = session.id(), closed, "[Engine] Closed unanswered tool calls");
        }
        if let Some(complexity) = session.classify_opening_request(&request.prompt) {
            debug!(session_id = session.id(), complexity = %complexity, "[Engine] Request classified");
        }
        session.push_message(ChatMessage::user(request.prompt));

        let turn = Turn {
            session,
            persona,
            depth: 0,
            cancel,
        };
        let mut stats = TurnStats::default();
        self.drive(&turn, sink, 0, &mut stats).await
    }

    async fn resume_turn(
        &self,
        session_id: &str,
        action_id: &str,
        approved: bool,
        sink: &EventSink,
        cancel: CancellationToken,
    ) -> TurnEnd {
        let Some(session) = self.sessions.get(session_id).await else {
            return failed(ForgeError::not_found("session", session_id));
        };
        let _guard = match session.begin_turn() {
            Ok(guard) => guard,
            Err(err) => return failed(err),
        };
        let cancel = session.bind_turn_cancel(&cancel);
        let action = match session.take_pending_action(action_id) {
            Ok(action) => action,
            Err(err) => return failed(err),
        };
        let persona = match self.personas.resolve(&session.persona_id()) {
            Ok(persona) => persona,
            Err(err) => return failed(err),
        };
        info!(session_id, action_id, approved, tool = %action.call.name, "[Engine] Confirmation received");

        let turn = Turn {
            session,
            persona,
            depth: 0,
            cancel,
        };
        let mut stats = TurnStats::default();
        let PendingAction {
            step,
            call,
            remaining,
            ..
        } = action;

        let held = if approved {
            self.dispatch(&turn, sink, &call, &mut stats).await
        } else {
            self.reject(&turn, sink, &call, &mut stats).await
        };
        match held {
            Ok(Flow::Finish(reason)) => return TurnEnd::Done(reason),
            Ok(Flow::Continue) => {}
            Err(err) => return failed(err),
        }
        match self
            .dispatch_all(&turn, sink, step, remaining, &mut stats)
            .await
        {
            Ok(Flow::Finish(reason)) => return TurnEnd::Done(reason),
            Ok(Flow::Continue) => {}
            Err(err) => return failed(err),
        }
        self.drive(&turn, sink, step + 1, &mut stats).await
    }

    /// Emits the terminal frames of a turn.
    async fn finish(&self, sink: &EventSink, end: TurnEnd) {
        let reason = match end {
            TurnEnd::Done(reason) => reason,
            TurnEnd::Failed(kind, message, reason) => {
                let _ = sink.emit(EventPayload::Error { kind, message }).await;
                reason
            }
        };
        info!(session_id = sink.session_id(), reason = %reason, dropped = sink.dropped(), "[Engine] Turn finished");
        let _ = sink.emit(EventPayload::Done { reason }).await;
    }

    // ============================================================================
    // Loop
    // ============================================================================

    /// Runs LLM steps `first_step..max_steps`.
    async fn drive(
        &self,
        turn: &Turn,
        sink: &EventSink,
        first_step: usize,
        stats: &mut TurnStats,
    ) -> TurnEnd {
        for step in first_step..self.config.max_steps {
            if turn.cancel.is_cancelled() {
                return cancelled();
            }
            stats.steps += 1;

            let reply = match self.complete(turn, sink, step).await {
                Ok(reply) => reply,
                Err(err) => {
                    if let Some(transition) = turn.session.fail() {
                        let _ = emit_transition(sink, transition).await;
                    }
                    return failed(err);
                }
            };

            let calls = with_call_ids(turn.session.id(), step, reply.tool_calls);
            turn.session
                .push_message(ChatMessage::assistant(reply.content.clone(), calls.clone()));
            if !reply.content.is_empty() {
                stats.final_message = reply.content;
            }
            if calls.is_empty() {
                debug!(session_id = turn.session.id(), step, "[Engine] Assistant ended the turn");
                return TurnEnd::Done(DoneReason::EndTurn);
            }

            match self.dispatch_all(turn, sink, step, calls, stats).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Finish(reason)) => return TurnEnd::Done(reason),
                Err(err) => return failed(err),
            }
        }

        warn!(
            session_id = turn.session.id(),
            max_steps = self.config.max_steps,
            "[Engine] Step limit reached"
        );
        TurnEnd::Failed(
            ErrorKind::StepLimitExceeded,
            format!("step limit of {} exceeded", self.config.max_steps),
            DoneReason::StepLimit,
        )
    }

    /// Streams one assistant reply, forwarding text and tool announcements.
    async fn complete(&self, turn: &Turn, sink: &EventSink, step: usize) -> Result<LlmReply> {
        let session = &turn.session;
        if let Some(compaction) = session.compact_history(
            self.config.compact_threshold,
            self.config.compact_keep_recent,
        ) {
            info!(
                session_id = session.id(),
                step,
                folded = compaction.folded,
                kept = compaction.kept,
                "[Engine] History compacted"
            );
        }
        let phase = session.phase();
        let tools = advertised_tools(&turn.persona, phase, &self.tools);
        let plan = session.plan();
        let digest = session.history_digest();
        let prompt_ctx = PromptContext {
            workspace_id: session.workspace_id(),
            user_id: session.user_id(),
            phase,
            plan: plan.as_ref(),
            complexity: session.complexity(),
            history_digest: digest.as_deref(),
        };
        let system_prompt = build_system_prompt(&turn.persona, &prompt_ctx, &tools);
        let request = LlmRequest::new(
            system_prompt,
            session.llm_history(self.config.max_history_messages),
        )
        .with_tools(tools.iter().map(|t| t.schema()).collect());
        debug!(
            session_id = session.id(),
            step,
            tools = request.tools.len(),
            messages = request.messages.len(),
            "[Engine] Calling LLM"
        );

        let streamed = async {
            let mut stream = self.llm.stream(request).await?;
            let mut reply = LlmReply::default();
            while let Some(chunk) = stream.next().await {
                match chunk? {
                    LlmChunk::Text(text) => {
                        if !text.is_empty() {
                            sink.emit(EventPayload::Message {
                                content: text.clone(),
                            })
                            .await?;
                            reply.content.push_str(&text);
                        }
                    }
                    LlmChunk::ToolCallStart { index, id, name } => {
                        sink.emit(EventPayload::ToolCallStart {
                            tool_call_id: call_id(&id, session.id(), step, index),
                            tool_name: name,
                        })
                        .await?;
                    }
                    LlmChunk::ToolCall { index, mut call } => {
                        call.id = call_id(&call.id, session.id(), step, index);
                        reply.tool_calls.push(call);
                    }
                    LlmChunk::Done { finish_reason } => {
                        reply.finish_reason = finish_reason;
                        break;
                    }
                }
            }
            Ok::<_, ForgeError>(reply)
        };

        let limit = Duration::from_secs(self.config.llm_timeout_secs);
        tokio::select! {
            _ = turn.cancel.cancelled() => Err(ForgeError::Cancelled),
            outcome = tokio::time::timeout(limit, streamed) => match outcome {
                Ok(reply) => reply,
                Err(_) => Err(ForgeError::Timeout(format!("LLM call exceeded {}s", limit.as_secs()))),
            },
        }
    }

    /// Runs the calls of one assistant reply in order.
    async fn dispatch_all(
        &self,
        turn: &Turn,
        sink: &EventSink,
        step: usize,
        calls: Vec<ToolCallRequest>,
        stats: &mut TurnStats,
    ) -> Result<Flow> {
        let mut pending = calls.into_iter();
        while let Some(call) = pending.next() {
            if turn.cancel.is_cancelled() {
                return Err(ForgeError::Cancelled);
            }
            if self.config.confirm_destructive
                && turn.depth == 0
                && self.tools.requires_confirmation(&call.name)
            {
                self.hold(turn, sink, step, call, pending.collect()).await?;
                return Ok(Flow::Finish(DoneReason::AwaitingConfirmation));
            }
            if let Flow::Finish(reason) = self.dispatch(turn, sink, &call, stats).await? {
                return Ok(Flow::Finish(reason));
            }
        }
        Ok(Flow::Continue)
    }

    /// Parks a destructive call until the user decides.
    async fn hold(
        &self,
        turn: &Turn,
        sink: &EventSink,
        step: usize,
        call: ToolCallRequest,
        remaining: Vec<ToolCallRequest>,
    ) -> Result<()> {
        let action_id = format!("action_{}_{step}", short_id(turn.session.id()));
        info!(session_id = turn.session.id(), action_id = %action_id, tool = %call.name, "[Engine] Tool call held for confirmation");
        sink.emit(EventPayload::ConfirmationRequired {
            action_id: action_id.clone(),
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments_value(&call),
        })
        .await?;
        turn.session.set_pending_action(PendingAction {
            action_id,
            step,
            call,
            remaining,
        });
        Ok(())
    }

    /// Executes one tool call and reports it.
    async fn dispatch(
        &self,
        turn: &Turn,
        sink: &EventSink,
        call: &ToolCallRequest,
        stats: &mut TurnStats,
    ) -> Result<Flow> {
        let session = &turn.session;
        if let Some(transition) = session.start_execution() {
            emit_transition(sink, transition).await?;
        }

        sink.emit(EventPayload::ToolCall {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments_value(call),
        })
        .await?;

        let phase_before = session.phase();
        let ctx = self.tool_context(turn);
        let result = self
            .tools
            .execute_raw(&ctx, &call.name, &call.arguments)
            .await;
        stats.tool_calls += 1;
        if !result.success {
            stats.failed_tool_calls += 1;
            debug!(
                session_id = session.id(),
                tool = %call.name,
                error = ?result.error,
                "[Engine] Tool call failed"
            );
        }
        self.report(turn, sink, call, &result).await?;

        if result.success && PLAN_TOOLS.contains(&call.name.as_str()) {
            if let Some(plan) = session.plan() {
                sink.emit(EventPayload::PlanUpdate { plan }).await?;
            }
        }
        let phase_after = session.phase();
        if phase_after != phase_before {
            emit_transition(
                sink,
                PhaseTransition {
                    from: phase_before,
                    to: phase_after,
                },
            )
            .await?;
        }

        if result.error_kind == Some(ToolErrorKind::Cancelled) && turn.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }
        if result.success && call.name == ATTEMPT_COMPLETION {
            info!(session_id = session.id(), "[Engine] Completion accepted");
            return Ok(Flow::Finish(DoneReason::AttemptCompletion));
        }
        Ok(Flow::Continue)
    }

    async fn reject(
        &self,
        turn: &Turn,
        sink: &EventSink,
        call: &ToolCallRequest,
        stats: &mut TurnStats,
    ) -> Result<Flow> {
        sink.emit(EventPayload::ToolCall {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments_value(call),
        })
        .await?;
        let result =
            ToolResult::failure(ToolErrorKind::ExecutionFailed, "the user rejected this action");
        stats.tool_calls += 1;
        stats.failed_tool_calls += 1;
        self.report(turn, sink, call, &result).await?;
        Ok(Flow::Continue)
    }

    /// Emits `tool_result` and records the observation in history.
    async fn report(
        &self,
        turn: &Turn,
        sink: &EventSink,
        call: &ToolCallRequest,
        result: &ToolResult,
    ) -> Result<()> {
        let affected_resource = if result.success {
            self.tools.affected_resource(&call.name).map(str::to_string)
        } else {
            None
        };
        sink.emit(EventPayload::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success: result.success,
            output: result.output.clone(),
            data: result.data.clone(),
            error: result.error.clone(),
            affected_resource,
        })
        .await?;
        turn.session.push_message(ChatMessage::tool(
            call.id.clone(),
            call.name.clone(),
            result.observation(),
        ));
        Ok(())
    }

    fn tool_context(&self, turn: &Turn) -> ToolContext {
        let session = &turn.session;
        let mut ctx = ToolContext::new(session.workspace_id(), session.user_id())
            .with_session(Arc::clone(session))
            .with_persona(&turn.persona)
            .with_cancel(turn.cancel.clone())
            .with_depth(turn.depth);
        if let Some(engine) = self.me.upgrade() {
            ctx = ctx.with_runtime(engine);
        }
        ctx
    }
}

// ============================================================================
// Sub-agents
// ============================================================================

#[async_trait]
impl AgentRuntime for Engine {
    async fn run_sub_agent(
        &self,
        request: SubAgentRequest,
        cancel: CancellationToken,
    ) -> Result<SubAgentOutcome> {
        let persona = self
            .personas
            .get(&request.persona_id)
            .ok_or_else(|| ForgeError::not_found("persona", request.persona_id.clone()))?;
        let session_id = format!("sub_{}", Uuid::new_v4().simple());
        let session = Arc::new(Session::new(
            session_id.clone(),
            request.workspace_id,
            request.user_id,
            persona.id.clone(),
        ));
        session.push_message(ChatMessage::user(request.prompt));
        info!(session_id = %session_id, persona_id = %persona.id, depth = request.depth, "[Engine] Sub-agent session started");

        let turn = Turn {
            session,
            persona,
            depth: request.depth,
            cancel,
        };
        let sink = EventSink::discard();
        let mut stats = TurnStats::default();
        let reason = match self.drive(&turn, &sink, 0, &mut stats).await {
            TurnEnd::Done(reason) => reason,
            TurnEnd::Failed(kind, message, reason) => {
                warn!(session_id = %session_id, kind = %kind, message = %message, "[Engine] Sub-agent failed");
                if stats.final_message.is_empty() {
                    stats.final_message = message;
                }
                reason
            }
        };
        Ok(SubAgentOutcome {
            session_id,
            final_message: stats.final_message,
            tool_calls: stats.tool_calls,
            failed_tool_calls: stats.failed_tool_calls,
            steps: stats.steps,
            reason,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn short_id(session_id: &str) -> &str {
    match session_id.char_indices().nth(8) {
        Some((idx, _)) => &session_id[..idx],
        None => session_id,
    }
}

/// The provider's id, or `call_<session8>_<step>_<index>` when it sent none.
fn call_id(provided: &str, session_id: &str, step: usize, index: usize) -> String {
    if provided.is_empty() {
        format!("call_{}_{step}_{index}", short_id(session_id))
    } else {
        provided.to_string()
    }
}

fn with_call_ids(session_id: &str, step: usize, calls: Vec<ToolCallRequest>) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .enumerate()
        .map(|(index, mut call)| {
            call.id = call_id(&call.id, session_id, step, index);
            call
        })
        .collect()
}

/// Arguments as JSON for events; malformed text is passed through as a string.
fn arguments_value(call: &ToolCallRequest) -> Value {
    call.parsed_arguments()
        .unwrap_or_else(|_| Value::String(call.arguments.clone()))
}

/// Answers a held call (and the calls queued behind it) that the user never
/// decided on, so every tool call in history keeps a result.
fn abandon_pending_action(session: &Session) {
    let Some(action) = session
        .pending_action()
        .and_then(|a| session.take_pending_action(&a.action_id).ok())
    else {
        return;
    };
    debug!(session_id = session.id(), action_id = %action.action_id, "[Engine] Pending action abandoned");
    for call in std::iter::once(action.call).chain(action.remaining) {
        session.push_message(ChatMessage::tool(
            call.id,
            call.name,
            "Error: not executed, the user sent a new message instead of confirming",
        ));
    }
}

async fn emit_transition(sink: &EventSink, transition: PhaseTransition) -> Result<()> {
    debug!(from = %transition.from, to = %transition.to, "[Engine] Phase changed");
    sink.emit(EventPayload::PhaseChange {
        from: transition.from,
        to: transition.to,
    })
    .await
}

fn cancelled() -> TurnEnd {
    TurnEnd::Failed(
        ErrorKind::Cancelled,
        "turn cancelled".to_string(),
        DoneReason::Cancelled,
    )
}

/// Maps an engine-level failure to its error frame.
fn failed(err: ForgeError) -> TurnEnd {
    match err {
        ForgeError::Cancelled => cancelled(),
        ForgeError::SessionBusy(id) => TurnEnd::Failed(
            ErrorKind::SessionBusy,
            format!("session {id} is already running a turn"),
            DoneReason::Error,
        ),
        err @ (ForgeError::Llm { .. } | ForgeError::Timeout(_)) => {
            warn!(error = %err, "[Engine] LLM call failed");
            TurnEnd::Failed(ErrorKind::LlmError, err.to_string(), DoneReason::Error)
        }
        ForgeError::Internal(detail) => {
            error!(error = %detail, "[Engine] Internal error");
            TurnEnd::Failed(
                ErrorKind::Internal,
                "internal error".to_string(),
                DoneReason::Error,
            )
        }
        err => {
            warn!(error = %err, "[Engine] Turn aborted");
            TurnEnd::Failed(ErrorKind::Internal, err.to_string(), DoneReason::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_ids_are_synthesised_when_missing() {
        let calls = vec![
            ToolCallRequest::new("", "a", "{}"),
            ToolCallRequest::new("provider_1", "b", "{}"),
        ];
        let calls = with_call_ids("0123456789abcdef", 3, calls);
        assert_eq!(calls[0].id, "call_01234567_3_0");
        assert_eq!(calls[1].id, "provider_1");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_failures_map_to_stable_kinds() {
        let kind = |err| match failed(err) {
            TurnEnd::Failed(kind, message, reason) => (kind, message, reason),
            TurnEnd::Done(_) => unreachable!(),
        };
        assert_eq!(kind(ForgeError::Cancelled).2, DoneReason::Cancelled);
        assert_eq!(kind(ForgeError::SessionBusy("s".into())).0, ErrorKind::SessionBusy);
        assert_eq!(kind(ForgeError::llm("503", true)).0, ErrorKind::LlmError);
        let internal = kind(ForgeError::internal("db handle poisoned at 0x1"));
        assert_eq!(internal.0, ErrorKind::Internal);
        assert_eq!(internal.1, "internal error");
    }

    #[test]
    fn test_malformed_arguments_pass_through() {
        let call = ToolCallRequest::new("c", "a", "{oops");
        assert_eq!(arguments_value(&call), Value::String("{oops".into()));
    }
}
