//! Read-session state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// Lifecycle states of one read session.
///
/// Terminal states are sticky: once a session reaches `Complete`, `Failed`,
/// or `Partial` it never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, not yet started
    Idle,
    /// Spawning the external tool
    Launching,
    /// Tool running, waiting for first output
    Reading,
    /// Consuming and assembling tool output
    Parsing,
    /// Committing the assembled graph to the catalog
    Reconciling,
    /// Commit done, emitting final status
    Finalizing,
    /// Full graph committed
    Complete,
    /// Nothing committed
    Failed,
    /// Tool died mid-output; partial graph committed
    Partial,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Complete | SessionState::Failed | SessionState::Partial
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Launching => "launching",
            SessionState::Reading => "reading",
            SessionState::Parsing => "parsing",
            SessionState::Reconciling => "reconciling",
            SessionState::Finalizing => "finalizing",
            SessionState::Complete => "complete",
            SessionState::Failed => "failed",
            SessionState::Partial => "partial",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One read session's identity and progression
#[derive(Debug, Clone)]
pub struct ReadSession {
    pub session_id: Uuid,
    pub device_path: PathBuf,
    pub state: SessionState,
    /// Operator asked for a re-read even if the disc is already cataloged
    pub explicit_reread: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ReadSession {
    pub fn new(device_path: PathBuf, explicit_reread: bool) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            device_path,
            state: SessionState::Idle,
            explicit_reread,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Move to a new state. Transitions out of a terminal state are ignored
    /// with a warning.
    pub fn transition_to(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            warn!(
                session_id = %self.session_id,
                current = %self.state,
                requested = %next,
                "Ignoring transition out of terminal state"
            );
            return;
        }
        info!(
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            "Session state transition"
        );
        self.state = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }
}
