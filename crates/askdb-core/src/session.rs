//! Session record and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, no reasoning step suspended
    Idle,
    /// Suspended mid-query, waiting for a human answer
    AwaitingHumanInput,
    /// Last turn produced a final answer; still open for new queries
    Completed,
    /// Idle past the threshold; the thread id is permanently retired
    Expired,
}

impl SessionStatus {
    /// Whether a new query may be submitted against this status.
    ///
    /// Idle and Completed are equivalent entry points: a session is
    /// conversationally open-ended, not single-use.
    pub fn accepts_query(self) -> bool {
        matches!(self, SessionStatus::Idle | SessionStatus::Completed)
    }
}

/// Server-held state for one multi-turn conversation.
///
/// The suspension fields (`original_query`, `interruption_context`,
/// `mcq_options`) are populated exactly while the status is
/// `AwaitingHumanInput` and cleared on every transition away from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque unique token, stable across resumptions
    pub thread_id: String,
    /// Current lifecycle status
    pub status: SessionStatus,
    /// Natural-language text that triggered the suspended reasoning step
    pub original_query: Option<String>,
    /// Opaque state handed back by the reasoning engine describing where
    /// reasoning paused. Never interpreted here, only stored and replayed.
    pub interruption_context: Option<serde_json::Value>,
    /// Ordered human-readable choices; empty means free-text answer expected
    #[serde(default)]
    pub mcq_options: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last activity timestamp, drives idle expiry
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Create a fresh idle session with a new thread id.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            thread_id: Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            original_query: None,
            interruption_context: None,
            mcq_options: vec![],
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Whether the session is waiting for a human answer.
    pub fn is_awaiting(&self) -> bool {
        self.status == SessionStatus::AwaitingHumanInput
    }

    /// Suspend on an interruption: record what was asked and where the
    /// engine paused.
    pub fn suspend(
        &mut self,
        original_query: impl Into<String>,
        context: serde_json::Value,
        mcq_options: Vec<String>,
    ) {
        self.status = SessionStatus::AwaitingHumanInput;
        self.original_query = Some(original_query.into());
        self.interruption_context = Some(context);
        self.mcq_options = mcq_options;
        self.touch();
    }

    /// Replace the suspension with a further interruption raised while
    /// resolving the previous one. The original query is preserved; the
    /// session still answers the same logical question.
    pub fn suspend_again(&mut self, context: serde_json::Value, mcq_options: Vec<String>) {
        self.status = SessionStatus::AwaitingHumanInput;
        self.interruption_context = Some(context);
        self.mcq_options = mcq_options;
        self.touch();
    }

    /// Transition to Completed and clear the suspension fields.
    pub fn complete(&mut self) {
        self.status = SessionStatus::Completed;
        self.original_query = None;
        self.interruption_context = None;
        self.mcq_options = vec![];
        self.touch();
    }

    /// Retire the session. Clears suspension state so the invariant
    /// (awaiting ⇔ context present) keeps holding.
    pub fn expire(&mut self) {
        self.status = SessionStatus::Expired;
        self.original_query = None;
        self.interruption_context = None;
        self.mcq_options = vec![];
    }

    /// Update the activity timestamp.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }

    /// Check the suspension-field coupling: awaiting status, interruption
    /// context and original query are all present or all absent.
    pub fn suspension_consistent(&self) -> bool {
        let awaiting = self.is_awaiting();
        awaiting == self.interruption_context.is_some()
            && awaiting == self.original_query.is_some()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
