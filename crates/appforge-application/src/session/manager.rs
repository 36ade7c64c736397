use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use appforge_core::config::SessionConfig;
use appforge_core::{ForgeError, Result};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::model::{CancelOutcome, Session, SessionSummary};

/// Manages resident sessions and their lifecycle.
///
/// `SessionManager` is responsible for:
/// - Creating sessions on first use
/// - Looking up sessions by id
/// - Evicting sessions that have been idle longer than the TTL
///
/// Sessions are not persisted; a process restart drops them.
pub struct SessionManager {
    /// In-memory session map
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    /// Idle time after which a session is reaped
    ttl: Duration,
}

impl SessionManager {
    /// Creates a new `SessionManager`.
    ///
    /// # Arguments
    ///
    /// * `config` - Session TTL settings
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the session with `session_id`, creating it when absent.
    ///
    /// A missing or empty `session_id` always creates a new session with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the existing session belongs to another
    /// workspace or user.
    pub async fn get_or_create(
        &self,
        session_id: Option<&str>,
        workspace_id: &str,
        user_id: &str,
        persona_id: &str,
    ) -> Result<Arc<Session>> {
        let id = match session_id.filter(|s| !s.trim().is_empty()) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&id) {
            if existing.workspace_id() != workspace_id || existing.user_id() != user_id {
                return Err(ForgeError::PermissionDenied(format!(
                    "session {id} belongs to another workspace or user"
                )));
            }
            existing.touch();
            return Ok(Arc::clone(existing));
        }

        let session = Arc::new(Session::new(id.clone(), workspace_id, user_id, persona_id));
        sessions.insert(id.clone(), Arc::clone(&session));
        debug!(session_id = %id, workspace_id, persona_id, "[SessionManager] Session created");
        Ok(session)
    }

    /// Gets a session by id.
    ///
    /// # Returns
    ///
    /// `Some(session)` if the session is resident, `None` otherwise.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Cancels a session: stops its running turn, drops its pending action and
    /// marks it failed. The session stays resident.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no session has `session_id`.
    pub async fn cancel(&self, session_id: &str) -> Result<CancelOutcome> {
        let session = self
            .get(session_id)
            .await
            .ok_or_else(|| ForgeError::not_found("session", session_id))?;
        let outcome = session.cancel();
        info!(
            session_id,
            interrupted_turn = outcome.interrupted_turn,
            abandoned_calls = outcome.abandoned_calls,
            "[SessionManager] Session cancelled"
        );
        Ok(outcome)
    }

    /// Removes a session.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(session_id)
    }

    /// Lists all resident sessions, most recently active first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions.values().map(|s| s.summary()).collect();
        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        summaries
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Evicts sessions idle for longer than the TTL. Busy sessions are kept.
    ///
    /// # Returns
    ///
    /// The number of sessions removed.
    pub async fn reap_idle(&self) -> usize {
        self.reap_idle_at(Utc::now()).await
    }

    /// `reap_idle` against an explicit clock.
    pub async fn reap_idle_at(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| {
            session.is_busy() || now.signed_duration_since(session.last_activity_at()) <= ttl
        });
        let removed = before - sessions.len();
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "[SessionManager] Reaped idle sessions");
        }
        removed
    }

    /// Spawns a background task that reaps idle sessions every `interval`
    /// until `cancel` fires.
    pub fn spawn_reaper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("[SessionManager] Reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.reap_idle().await;
                    }
                }
            }
        })
    }
}
