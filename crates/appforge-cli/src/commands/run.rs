use std::io::Write;

use anyhow::Result;
use appforge_core::config::ForgeConfig;
use appforge_core::event::{AgentEvent, DoneReason, EventPayload};
use appforge_core::plan::PlanStatus;
use appforge_core::session::SessionPhase;
use appforge_core::workspace::Workspace;
use appforge_execution::{AppRuntime, EventStream, RunRequest, sse};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::open_runtime;

const PROCEED_PROMPT: &str = "The plan is confirmed. Proceed with the first step.";

#[derive(Args)]
pub struct RunArgs {
    /// Workspace id; created on first use
    #[arg(long, short)]
    pub workspace: String,
    /// Prompt for the agent
    pub prompt: String,
    #[arg(long, short, default_value = "local")]
    pub user: String,
    /// Continue an existing session (sessions live for the duration of the process)
    #[arg(long)]
    pub session: Option<String>,
    #[arg(long)]
    pub persona: Option<String>,
    /// Approve destructive tool calls instead of stopping at them
    #[arg(long)]
    pub approve: bool,
    /// Confirm a drafted plan and let the agent carry it out
    #[arg(long)]
    pub confirm_plan: bool,
}

/// How one event stream ended.
struct StreamEnd {
    session_id: String,
    reason: Option<DoneReason>,
    pending_action: Option<String>,
}

pub async fn run(config: ForgeConfig, args: RunArgs) -> Result<()> {
    let mut runtime = open_runtime(config)?;
    runtime.start_background();
    ensure_workspace(&runtime, &args.workspace, &args.user).await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let result = drive(&runtime, &args, &cancel).await;
    runtime.shutdown().await;
    result
}

async fn drive(runtime: &AppRuntime, args: &RunArgs, cancel: &CancellationToken) -> Result<()> {
    let request = RunRequest {
        workspace_id: args.workspace.clone(),
        user_id: args.user.clone(),
        prompt: args.prompt.clone(),
        session_id: args.session.clone(),
        persona_id: args.persona.clone(),
    };
    let mut end = print_stream(runtime.engine.run(request, cancel.child_token())).await?;
    let mut plan_confirmed = false;

    loop {
        match end.reason {
            Some(DoneReason::AwaitingConfirmation) if args.approve => {
                let Some(action_id) = end.pending_action.take() else {
                    break;
                };
                info!(session_id = %end.session_id, action_id = %action_id, "[Cli] Approving held action");
                let stream = runtime.engine.confirm(
                    &end.session_id,
                    &action_id,
                    true,
                    cancel.child_token(),
                );
                end = print_stream(stream).await?;
            }
            Some(DoneReason::EndTurn) if args.confirm_plan && !plan_confirmed => {
                let Some(session) = runtime.sessions.get(&end.session_id).await else {
                    break;
                };
                let drafted = session.phase() == SessionPhase::Planning
                    && session.plan().is_some_and(|p| p.status == PlanStatus::Draft);
                if !drafted {
                    break;
                }
                session.confirm_plan()?;
                plan_confirmed = true;
                info!(session_id = %end.session_id, "[Cli] Plan confirmed");
                let request = RunRequest {
                    workspace_id: args.workspace.clone(),
                    user_id: args.user.clone(),
                    prompt: PROCEED_PROMPT.to_string(),
                    session_id: Some(end.session_id.clone()),
                    persona_id: None,
                };
                end = print_stream(runtime.engine.run(request, cancel.child_token())).await?;
            }
            Some(DoneReason::AwaitingConfirmation) => {
                warn!("[Cli] Turn stopped at a destructive call; rerun with --approve to allow it");
                break;
            }
            _ => break,
        }
    }
    Ok(())
}

async fn print_stream(mut stream: EventStream) -> Result<StreamEnd> {
    let mut end = StreamEnd {
        session_id: String::new(),
        reason: None,
        pending_action: None,
    };
    while let Some(event) = stream.recv().await {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(sse::frame(&event)?.as_bytes())?;
        stdout.flush()?;
        record(&mut end, &event);
    }
    Ok(end)
}

fn record(end: &mut StreamEnd, event: &AgentEvent) {
    end.session_id = event.session_id.clone();
    match &event.payload {
        EventPayload::ConfirmationRequired { action_id, .. } => {
            end.pending_action = Some(action_id.clone());
        }
        EventPayload::Done { reason } => end.reason = Some(*reason),
        _ => {}
    }
}

async fn ensure_workspace(runtime: &AppRuntime, workspace_id: &str, user_id: &str) -> Result<()> {
    if runtime.workspaces.get_workspace(workspace_id).await?.is_none() {
        runtime
            .workspaces
            .create_workspace(Workspace::new(workspace_id, workspace_id, user_id))
            .await?;
        info!(workspace_id, "[Cli] Created workspace");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tracks_pending_action_and_reason() {
        let mut end = StreamEnd {
            session_id: String::new(),
            reason: None,
            pending_action: None,
        };
        record(
            &mut end,
            &AgentEvent::new(
                "s1",
                EventPayload::ConfirmationRequired {
                    action_id: "action_s1_0".into(),
                    tool_call_id: "call_1".into(),
                    tool_name: "delete_table".into(),
                    arguments: serde_json::json!({"table_name": "old"}),
                },
            ),
        );
        record(
            &mut end,
            &AgentEvent::new(
                "s1",
                EventPayload::Done {
                    reason: DoneReason::AwaitingConfirmation,
                },
            ),
        );
        assert_eq!(end.session_id, "s1");
        assert_eq!(end.pending_action.as_deref(), Some("action_s1_0"));
        assert_eq!(end.reason, Some(DoneReason::AwaitingConfirmation));
    }
}
