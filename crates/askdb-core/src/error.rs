//! Error types for AskDB.
//!
//! The session protocol has a small, deliberate taxonomy: callers need to
//! distinguish client mistakes (protocol violations) from retryable
//! conditions (busy sessions, engine failures) and from ordinary lookup
//! misses that the gateway recovers from transparently.

use thiserror::Error;

/// Result type alias using the AskDB error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for AskDB.
#[derive(Error, Debug)]
pub enum Error {
    /// Client sent a turn that the session's current status forbids,
    /// e.g. a new query against a session awaiting a human answer.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Unknown thread id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Thread id was retired by the idle sweep; it is never reassigned.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Another request on the same session is still in flight.
    #[error("Session busy: {0}")]
    SessionBusy(String),

    /// Compare-and-swap update lost the race against a concurrent writer.
    #[error("Conflicting update on session {0}")]
    Conflict(String),

    /// The reasoning engine errored or timed out. The session keeps its
    /// prior committed status, so the same turn can be retried.
    #[error("Reasoning engine failure: {0}")]
    EngineFailure(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the caller should retry the same turn.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SessionBusy(_) | Error::Conflict(_) | Error::EngineFailure(_)
        )
    }

    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ProtocolViolation(_) => {
                Some("Answer the pending question before sending a new query")
            }
            Error::SessionNotFound(_) | Error::SessionExpired(_) => {
                Some("Omit thread_id to start a fresh conversation")
            }
            Error::SessionBusy(_) | Error::Conflict(_) => {
                Some("Wait a moment and resend the same turn")
            }
            Error::EngineFailure(_) => Some("Retry the turn; the session state is unchanged"),
            Error::Config(_) => Some("Check your config file at ~/.config/askdb/config.toml"),
            _ => None,
        }
    }
}
