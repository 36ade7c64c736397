//! Lock-guarded conversation state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use appforge_core::plan::{Plan, PlanStatus, StepStatus};
use appforge_core::session::{ChatMessage, MessageRole, SessionPhase, ToolCallRequest};
use appforge_core::{ForgeError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::compaction::{Compaction, HistoryDigest, fold_point};
use crate::complexity::{RequestComplexity, classify_request};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A phase change produced by a session operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
}

/// A tool call held back until the user approves it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action_id: String,
    pub step: usize,
    pub call: ToolCallRequest,
    /// Calls of the same assistant turn that had not run yet
    pub remaining: Vec<ToolCallRequest>,
}

/// Result of `Session::update_step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepUpdate {
    pub plan: Plan,
    /// Set when this update auto-completed the plan
    pub plan_completed: bool,
    pub transition: Option<PhaseTransition>,
}

/// Result of `Session::cancel`.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub transition: Option<PhaseTransition>,
    /// A running turn was signalled to stop
    pub interrupted_turn: bool,
    /// Held tool calls answered with a cancellation observation
    pub abandoned_calls: usize,
}

/// Serializable view of a session for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub persona_id: String,
    pub phase: SessionPhase,
    pub message_count: usize,
    pub has_plan: bool,
    pub busy: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionState {
    persona_id: String,
    phase: SessionPhase,
    history: Vec<ChatMessage>,
    plan: Option<Plan>,
    pending_action: Option<PendingAction>,
    digest: HistoryDigest,
    complexity: Option<RequestComplexity>,
    /// Token of the turn holding the session
    turn_cancel: Option<CancellationToken>,
    last_activity_at: DateTime<Utc>,
}

impl SessionState {
    fn set_phase(&mut self, to: SessionPhase) -> Option<PhaseTransition> {
        let from = self.phase;
        if from == to {
            return None;
        }
        self.phase = to;
        Some(PhaseTransition { from, to })
    }

    /// Answers every call of the last tool-calling assistant message that has
    /// no result yet.
    fn close_open_calls(&mut self, observation: &str) -> usize {
        let Some(start) = self.history.iter().rposition(ChatMessage::has_tool_calls) else {
            return 0;
        };
        let answered: Vec<&str> = self.history[start + 1..]
            .iter()
            .filter_map(|m| m.tool_call_id.as_deref())
            .collect();
        let open: Vec<ChatMessage> = self.history[start]
            .tool_calls
            .iter()
            .filter(|call| !answered.contains(&call.id.as_str()))
            .map(|call| ChatMessage::tool(call.id.clone(), call.name.clone(), observation))
            .collect();
        let closed = open.len();
        self.history.extend(open);
        closed
    }
}

/// One conversation between a user and the agent.
///
/// Identity fields are immutable. Phase, plan and history live behind a single
/// mutex, so plan mutations are single-writer. The `busy` flag admits at most one
/// running turn.
#[derive(Debug)]
pub struct Session {
    id: String,
    workspace_id: String,
    user_id: String,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    busy: AtomicBool,
}

/// Marks a session busy for the lifetime of a turn.
pub struct TurnGuard {
    session: Arc<Session>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        lock(&self.session.state).turn_cancel = None;
        self.session.busy.store(false, Ordering::Release);
    }
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        user_id: impl Into<String>,
        persona_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            user_id: user_id.into(),
            created_at: now,
            state: Mutex::new(SessionState {
                persona_id: persona_id.into(),
                phase: SessionPhase::Planning,
                history: Vec::new(),
                plan: None,
                pending_action: None,
                digest: HistoryDigest::default(),
                complexity: None,
                turn_cancel: None,
                last_activity_at: now,
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn persona_id(&self) -> String {
        lock(&self.state).persona_id.clone()
    }

    pub fn set_persona_id(&self, persona_id: impl Into<String>) {
        lock(&self.state).persona_id = persona_id.into();
    }

    pub fn phase(&self) -> SessionPhase {
        lock(&self.state).phase
    }

    pub fn plan(&self) -> Option<Plan> {
        lock(&self.state).plan.clone()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        lock(&self.state).last_activity_at
    }

    pub fn touch(&self) {
        lock(&self.state).last_activity_at = Utc::now();
    }

    // ============================================================================
    // Turn admission
    // ============================================================================

    /// Claims the session for one turn.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::SessionBusy` when another turn holds the session.
    pub fn begin_turn(self: &Arc<Self>) -> Result<TurnGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ForgeError::SessionBusy(self.id.clone()));
        }
        self.touch();
        Ok(TurnGuard {
            session: Arc::clone(self),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Derives the token the current turn runs under from `parent`.
    ///
    /// `cancel` fires it; the turn guard forgets it when the turn ends.
    pub fn bind_turn_cancel(&self, parent: &CancellationToken) -> CancellationToken {
        let token = parent.child_token();
        lock(&self.state).turn_cancel = Some(token.clone());
        token
    }

    /// Stops the session.
    ///
    /// Fires the running turn's token, answers a held tool call and the calls
    /// queued behind it, and moves an unfinished session to `failed` (an
    /// in-progress plan fails with it). A finished session keeps its phase.
    pub fn cancel(&self) -> CancelOutcome {
        let mut state = lock(&self.state);
        let interrupted_turn = match state.turn_cancel.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        };
        let mut abandoned_calls = 0;
        if let Some(action) = state.pending_action.take() {
            for call in std::iter::once(action.call).chain(action.remaining) {
                state.history.push(ChatMessage::tool(
                    call.id,
                    call.name,
                    "Error: not executed, the session was cancelled",
                ));
                abandoned_calls += 1;
            }
        }
        let transition = if state.phase.is_finished() {
            None
        } else {
            if let Some(plan) = state.plan.as_mut() {
                if plan.status == PlanStatus::InProgress {
                    plan.status = PlanStatus::Failed;
                }
            }
            state.set_phase(SessionPhase::Failed)
        };
        state.last_activity_at = Utc::now();
        debug!(session_id = %self.id, interrupted_turn, abandoned_calls, "[Session] Cancelled");
        CancelOutcome {
            transition,
            interrupted_turn,
            abandoned_calls,
        }
    }

    // ============================================================================
    // History
    // ============================================================================

    pub fn push_message(&self, message: ChatMessage) {
        let mut state = lock(&self.state);
        state.history.push(message);
        state.last_activity_at = Utc::now();
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        lock(&self.state).history.clone()
    }

    pub fn history_len(&self) -> usize {
        lock(&self.state).history.len()
    }

    /// History as sent to the LLM, bounded to roughly `max_messages` entries.
    ///
    /// Always keeps the latest user message and never starts inside a tool
    /// exchange, so every tool result stays paired with the call that produced it.
    /// The plan is not part of history; prompt composition injects it.
    pub fn llm_history(&self, max_messages: usize) -> Vec<ChatMessage> {
        truncate_history(&lock(&self.state).history, max_messages)
    }

    /// Answers tool calls a previous turn left without results, e.g. after it
    /// was cancelled mid-reply.
    pub fn close_open_tool_calls(&self, observation: &str) -> usize {
        lock(&self.state).close_open_calls(observation)
    }

    /// Folds older history into the session digest once it grows past `threshold`.
    ///
    /// The newest `keep_recent` messages stay verbatim (the cut moves back rather
    /// than split a tool exchange) and the latest user message is always kept.
    /// A `threshold` of 0 disables compaction.
    pub fn compact_history(&self, threshold: usize, keep_recent: usize) -> Option<Compaction> {
        let mut state = lock(&self.state);
        if threshold == 0 || state.history.len() <= threshold {
            return None;
        }
        let cut = fold_point(&state.history, keep_recent)?;
        let last_user = state
            .history
            .iter()
            .rposition(|m| m.role == MessageRole::User);
        let mut folded: Vec<ChatMessage> = state.history.drain(..cut).collect();
        if let Some(index) = last_user.filter(|&i| i < cut) {
            let request = folded.remove(index);
            state.history.insert(0, request);
        }
        state.digest.absorb(&folded);
        let outcome = Compaction {
            folded: folded.len(),
            kept: state.history.len(),
        };
        debug!(session_id = %self.id, folded = outcome.folded, kept = outcome.kept, "[Session] History compacted");
        Some(outcome)
    }

    /// Rendered digest of compacted history, if anything was folded.
    pub fn history_digest(&self) -> Option<String> {
        let state = lock(&self.state);
        (!state.digest.is_empty()).then(|| state.digest.render())
    }

    // ============================================================================
    // Request complexity
    // ============================================================================

    /// Classifies `message` when the session is planning and has no class yet.
    ///
    /// Runs at most once per session; returns the class only when it was set now.
    pub fn classify_opening_request(&self, message: &str) -> Option<RequestComplexity> {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::Planning || state.complexity.is_some() {
            return None;
        }
        let complexity = classify_request(message);
        state.complexity = Some(complexity);
        Some(complexity)
    }

    pub fn complexity(&self) -> Option<RequestComplexity> {
        lock(&self.state).complexity
    }

    // ============================================================================
    // Phase and plan
    // ============================================================================

    /// Re-opens a completed or failed session for a new turn.
    pub fn reopen_if_finished(&self) -> Option<PhaseTransition> {
        let mut state = lock(&self.state);
        if state.phase.is_finished() {
            state.set_phase(SessionPhase::Planning)
        } else {
            None
        }
    }

    /// Stores a new draft plan.
    ///
    /// Allowed in `planning` and `executing`; a new plan while executing sends the
    /// session back to `planning` until it is confirmed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` in any other phase.
    pub fn set_plan(&self, mut plan: Plan) -> Result<Option<PhaseTransition>> {
        let mut state = lock(&self.state);
        if !state.phase.accepts_plan() {
            return Err(ForgeError::invalid_transition(format!(
                "cannot set a plan while the session is {}",
                state.phase
            )));
        }
        plan.status = PlanStatus::Draft;
        debug!(session_id = %self.id, steps = plan.steps.len(), "[Session] Plan stored");
        state.plan = Some(plan);
        state.last_activity_at = Utc::now();
        Ok(state.set_phase(SessionPhase::Planning))
    }

    /// Confirms the current draft plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` when there is no draft plan.
    pub fn confirm_plan(&self) -> Result<(Plan, Option<PhaseTransition>)> {
        let mut state = lock(&self.state);
        let plan = match state.plan.as_mut() {
            Some(plan) if plan.status == PlanStatus::Draft => plan,
            Some(plan) => {
                return Err(ForgeError::invalid_transition(format!(
                    "plan is {}, only a draft plan can be confirmed",
                    plan.status
                )));
            }
            None => return Err(ForgeError::invalid_transition("no plan to confirm")),
        };
        plan.status = PlanStatus::Confirmed;
        let confirmed = plan.clone();
        let transition = state.set_phase(SessionPhase::Confirmed);
        state.last_activity_at = Utc::now();
        Ok((confirmed, transition))
    }

    /// Moves a confirmed session into execution; the plan becomes `in_progress`.
    pub fn start_execution(&self) -> Option<PhaseTransition> {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::Confirmed {
            return None;
        }
        if let Some(plan) = state.plan.as_mut() {
            if plan.status == PlanStatus::Confirmed {
                plan.status = PlanStatus::InProgress;
            }
        }
        state.set_phase(SessionPhase::Executing)
    }

    /// Marks an executing session failed.
    pub fn fail(&self) -> Option<PhaseTransition> {
        let mut state = lock(&self.state);
        if state.phase != SessionPhase::Executing {
            return None;
        }
        if let Some(plan) = state.plan.as_mut() {
            if plan.status == PlanStatus::InProgress {
                plan.status = PlanStatus::Failed;
            }
        }
        state.set_phase(SessionPhase::Failed)
    }

    /// Updates one plan step.
    ///
    /// When the plan is `in_progress` and every step becomes terminal, the plan
    /// and the session both move to `completed`. A draft plan never auto-completes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when there is no plan or no step with `step_id`.
    pub fn update_step(
        &self,
        step_id: &str,
        status: StepStatus,
        note: Option<String>,
    ) -> Result<StepUpdate> {
        let mut state = lock(&self.state);
        let plan = state
            .plan
            .as_mut()
            .ok_or_else(|| ForgeError::not_found("plan", self.id.clone()))?;
        let step = plan
            .find_step_mut(step_id)
            .ok_or_else(|| ForgeError::not_found("plan step", step_id))?;
        step.status = status;
        if note.is_some() {
            step.note = note;
        }

        let plan_completed = plan.status == PlanStatus::InProgress && plan.all_steps_terminal();
        if plan_completed {
            plan.status = PlanStatus::Completed;
        }
        let snapshot = plan.clone();
        let transition = if plan_completed {
            state.set_phase(SessionPhase::Completed)
        } else {
            None
        };
        state.last_activity_at = Utc::now();
        Ok(StepUpdate {
            plan: snapshot,
            plan_completed,
            transition,
        })
    }

    // ============================================================================
    // Confirmation
    // ============================================================================

    pub fn set_pending_action(&self, action: PendingAction) {
        lock(&self.state).pending_action = Some(action);
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        lock(&self.state).pending_action.clone()
    }

    /// Removes and returns the pending action if its id matches.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no action with `action_id` is pending.
    pub fn take_pending_action(&self, action_id: &str) -> Result<PendingAction> {
        let mut state = lock(&self.state);
        match state.pending_action.take() {
            Some(action) if action.action_id == action_id => Ok(action),
            other => {
                state.pending_action = other;
                Err(ForgeError::not_found("pending action", action_id))
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let state = lock(&self.state);
        SessionSummary {
            session_id: self.id.clone(),
            workspace_id: self.workspace_id.clone(),
            user_id: self.user_id.clone(),
            persona_id: state.persona_id.clone(),
            phase: state.phase,
            message_count: state.history.len(),
            has_plan: state.plan.is_some(),
            busy: self.is_busy(),
            created_at: self.created_at,
            last_activity_at: state.last_activity_at,
        }
    }
}

fn truncate_history(history: &[ChatMessage], max_messages: usize) -> Vec<ChatMessage> {
    if max_messages == 0 || history.len() <= max_messages {
        return history.to_vec();
    }
    let mut cut = history.len() - max_messages;
    while cut > 0 && history[cut].role == MessageRole::Tool {
        cut -= 1;
    }
    let mut kept = Vec::with_capacity(history.len() - cut + 1);
    if let Some(last_user) = history.iter().rposition(|m| m.role == MessageRole::User) {
        if last_user < cut {
            kept.push(history[last_user].clone());
        }
    }
    kept.extend_from_slice(&history[cut..]);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use appforge_core::plan::PlanStep;

    fn step(id: &str) -> PlanStep {
        PlanStep {
            id: id.to_string(),
            description: format!("do {id}"),
            tool: None,
            status: StepStatus::Pending,
            note: None,
            group_id: None,
        }
    }

    fn session_with_plan(steps: &[&str]) -> Session {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        let plan = Plan::draft("App", "", vec![], steps.iter().map(|s| step(s)).collect());
        session.set_plan(plan).unwrap();
        session
    }

    #[test]
    fn test_plan_lifecycle_completes_session() {
        let session = session_with_plan(&["s1", "s2"]);
        assert_eq!(session.phase(), SessionPhase::Planning);

        let (plan, transition) = session.confirm_plan().unwrap();
        assert_eq!(plan.status, PlanStatus::Confirmed);
        assert_eq!(transition.unwrap().to, SessionPhase::Confirmed);

        let transition = session.start_execution().unwrap();
        assert_eq!(transition.from, SessionPhase::Confirmed);
        assert_eq!(session.plan().unwrap().status, PlanStatus::InProgress);

        let first = session.update_step("s1", StepStatus::Completed, None).unwrap();
        assert!(!first.plan_completed);
        let last = session
            .update_step("s2", StepStatus::Completed, Some("done".into()))
            .unwrap();
        assert!(last.plan_completed);
        assert_eq!(last.plan.status, PlanStatus::Completed);
        assert_eq!(session.phase(), SessionPhase::Completed);
    }

    #[test]
    fn test_draft_plan_never_auto_completes() {
        let session = session_with_plan(&["only"]);
        let update = session.update_step("only", StepStatus::Completed, None).unwrap();
        assert!(!update.plan_completed);
        assert_eq!(update.plan.status, PlanStatus::Draft);
        assert_eq!(session.phase(), SessionPhase::Planning);
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let session = session_with_plan(&["a"]);
        let err = session
            .update_step("ghost", StepStatus::Completed, None)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_plan_rejected_after_confirmation() {
        let session = session_with_plan(&["a"]);
        session.confirm_plan().unwrap();
        let err = session.set_plan(Plan::draft("B", "", vec![], vec![step("b")]));
        assert!(matches!(err, Err(ForgeError::InvalidTransition(_))));
    }

    #[test]
    fn test_new_plan_while_executing_returns_to_planning() {
        let session = session_with_plan(&["a"]);
        session.confirm_plan().unwrap();
        session.start_execution();
        let transition = session
            .set_plan(Plan::draft("B", "", vec![], vec![step("b")]))
            .unwrap()
            .unwrap();
        assert_eq!(transition.from, SessionPhase::Executing);
        assert_eq!(transition.to, SessionPhase::Planning);
        assert_eq!(session.plan().unwrap().status, PlanStatus::Draft);
    }

    #[test]
    fn test_confirm_requires_draft() {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        assert!(session.confirm_plan().is_err());
    }

    #[test]
    fn test_finished_session_reopens_in_planning() {
        let session = session_with_plan(&["a"]);
        session.confirm_plan().unwrap();
        session.start_execution();
        session.update_step("a", StepStatus::Failed, None).unwrap();
        assert_eq!(session.phase(), SessionPhase::Completed);
        let transition = session.reopen_if_finished().unwrap();
        assert_eq!(transition.to, SessionPhase::Planning);
        assert!(session.reopen_if_finished().is_none());
    }

    #[test]
    fn test_second_turn_is_rejected_while_busy() {
        let session = Arc::new(Session::new("s1", "ws", "u1", "app_builder"));
        let guard = session.begin_turn().unwrap();
        assert!(session.is_busy());
        assert!(matches!(
            session.begin_turn(),
            Err(ForgeError::SessionBusy(_))
        ));
        drop(guard);
        assert!(!session.is_busy());
        assert!(session.begin_turn().is_ok());
    }

    #[test]
    fn test_truncation_keeps_latest_user_and_tool_pairs() {
        let mut history = vec![ChatMessage::user("build an app")];
        for i in 0..5 {
            let call = ToolCallRequest::new(format!("c{i}"), "query_data", "{}");
            history.push(ChatMessage::assistant("", vec![call]));
            history.push(ChatMessage::tool(format!("c{i}"), "query_data", "ok"));
        }
        let kept = truncate_history(&history, 3);
        // Cut would land on a tool message; it moves back to the assistant call.
        assert_eq!(kept.len(), 5);
        assert_eq!(kept[0].role, MessageRole::User);
        assert_eq!(kept[1].role, MessageRole::Assistant);
        assert_eq!(kept[2].tool_call_id.as_deref(), Some("c3"));

        history.push(ChatMessage::user("and add a chart"));
        let kept = truncate_history(&history, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].content, "and add a chart");
    }

    #[test]
    fn test_truncation_prepends_latest_user_message() {
        let mut history = vec![ChatMessage::user("only prompt")];
        for i in 0..4 {
            history.push(ChatMessage::assistant(format!("thinking {i}"), vec![]));
        }
        let kept = truncate_history(&history, 2);
        assert_eq!(kept[0].content, "only prompt");
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[1].content, "thinking 2");
    }

    #[test]
    fn test_cancel_answers_held_calls_and_fails_plan() {
        let session = session_with_plan(&["a", "b"]);
        session.confirm_plan().unwrap();
        session.start_execution();
        session.push_message(ChatMessage::assistant(
            "",
            vec![
                ToolCallRequest::new("c1", "delete_table", "{}"),
                ToolCallRequest::new("c2", "query_data", "{}"),
            ],
        ));
        session.set_pending_action(PendingAction {
            action_id: "action_s1_0".into(),
            step: 0,
            call: ToolCallRequest::new("c1", "delete_table", "{}"),
            remaining: vec![ToolCallRequest::new("c2", "query_data", "{}")],
        });

        let outcome = session.cancel();
        assert!(!outcome.interrupted_turn);
        assert_eq!(outcome.abandoned_calls, 2);
        assert_eq!(outcome.transition.unwrap().to, SessionPhase::Failed);
        assert!(session.pending_action().is_none());
        assert_eq!(session.plan().unwrap().status, PlanStatus::Failed);
        let history = session.history();
        assert_eq!(history[2].tool_call_id.as_deref(), Some("c2"));
        assert!(history[2].content.contains("cancelled"));
        assert_eq!(session.close_open_tool_calls("unused"), 0);

        assert!(session.cancel().transition.is_none());
    }

    #[test]
    fn test_open_calls_are_closed_once() {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        session.push_message(ChatMessage::user("go"));
        session.push_message(ChatMessage::assistant(
            "",
            vec![
                ToolCallRequest::new("c1", "create_table", "{}"),
                ToolCallRequest::new("c2", "insert_data", "{}"),
            ],
        ));
        session.push_message(ChatMessage::tool("c1", "create_table", "ok"));
        assert_eq!(session.close_open_tool_calls("Error: interrupted"), 1);
        assert_eq!(session.history()[3].tool_call_id.as_deref(), Some("c2"));
        assert_eq!(session.close_open_tool_calls("Error: interrupted"), 0);
    }

    #[test]
    fn test_compaction_folds_old_messages_into_digest() {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        session.push_message(ChatMessage::user("build a shop"));
        for i in 0..6 {
            let id = format!("c{i}");
            session.push_message(ChatMessage::assistant(
                "",
                vec![ToolCallRequest::new(id.clone(), "create_table", "{}")],
            ));
            session.push_message(ChatMessage::tool(id, "create_table", "ok"));
        }
        assert!(session.compact_history(20, 4).is_none());
        assert!(session.history_digest().is_none());

        // 13 messages; the latest user message is re-inserted ahead of the kept tail.
        let compaction = session.compact_history(10, 4).unwrap();
        assert_eq!(compaction.folded, 8);
        assert_eq!(compaction.kept, 5);
        let history = session.history();
        assert_eq!(history[0].content, "build a shop");
        assert_eq!(history[1].role, MessageRole::Assistant);

        let digest = session.history_digest().unwrap();
        assert!(digest.starts_with("8 earlier messages were folded."));
        assert!(digest.contains("create_table x4"));
        assert!(!digest.contains("Earlier requests"));
    }

    #[test]
    fn test_opening_request_is_classified_once() {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        assert_eq!(
            session.classify_opening_request("What tables do I have?"),
            Some(RequestComplexity::Question)
        );
        assert!(session.classify_opening_request("Build a CRM app").is_none());
        assert_eq!(session.complexity(), Some(RequestComplexity::Question));
    }

    #[test]
    fn test_pending_action_is_taken_once() {
        let session = Session::new("s1", "ws", "u1", "app_builder");
        session.set_pending_action(PendingAction {
            action_id: "action_s1_1".into(),
            step: 1,
            call: ToolCallRequest::new("c1", "delete_table", r#"{"table_name":"t"}"#),
            remaining: vec![],
        });
        assert!(session.take_pending_action("other").is_err());
        assert!(session.pending_action().is_some());
        let action = session.take_pending_action("action_s1_1").unwrap();
        assert_eq!(action.call.name, "delete_table");
        assert!(session.pending_action().is_none());
    }
}
