//! Session storage: lookup and compare-and-swap updates keyed by thread id.
//!
//! The store owns no business logic. Its one protocol duty is atomicity:
//! `update` commits a mutation only if the session still has the status the
//! caller observed, so two writers racing on the same session cannot
//! interleave a half-applied transition.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;

use askdb_core::{Session, SessionStatus};

/// Errors that can occur during session storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session {thread_id} is {actual:?}, expected {expected:?}")]
    Conflict {
        thread_id: String,
        expected: SessionStatus,
        actual: SessionStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Mutation applied under the store's atomicity guarantee.
pub type Mutator = Box<dyn FnOnce(&mut Session) + Send>;

/// Session storage trait for abstraction over backends.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a fresh session with a new unique thread id.
    async fn create(&self) -> Result<Session>;

    /// Get a session by thread id.
    async fn get(&self, thread_id: &str) -> Result<Session>;

    /// Compare-and-swap update: apply `mutator` only if the session still
    /// has `expected` status, returning the committed record.
    async fn update(
        &self,
        thread_id: &str,
        expected: SessionStatus,
        mutator: Mutator,
    ) -> Result<Session>;

    /// Retire a session immediately (client-initiated reset).
    async fn expire(&self, thread_id: &str) -> Result<()>;

    /// Retire sessions idle past `threshold` and evict sessions that have
    /// been retired for at least as long again. Returns retired ids.
    ///
    /// Evicted ids become permanently unknown; they are UUIDs and never
    /// reassigned, so a late resume fails clearly instead of attaching to
    /// an unrelated conversation.
    async fn sweep_idle(&self, threshold: Duration) -> Result<Vec<String>>;
}

/// In-memory session store, the default backend.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records, including retired tombstones.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self) -> Result<Session> {
        let session = Session::new();
        self.sessions
            .write()
            .insert(session.thread_id.clone(), session.clone());
        Ok(session)
    }

    async fn get(&self, thread_id: &str) -> Result<Session> {
        self.sessions
            .read()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))
    }

    async fn update(
        &self,
        thread_id: &str,
        expected: SessionStatus,
        mutator: Mutator,
    ) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;

        if session.status != expected {
            return Err(StoreError::Conflict {
                thread_id: thread_id.to_string(),
                expected,
                actual: session.status,
            });
        }

        mutator(session);
        Ok(session.clone())
    }

    async fn expire(&self, thread_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .get_mut(thread_id)
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;
        session.expire();
        Ok(())
    }

    async fn sweep_idle(&self, threshold: Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::zero());
        let mut retired = Vec::new();
        let mut sessions = self.sessions.write();

        for session in sessions.values_mut() {
            if session.status != SessionStatus::Expired && session.last_activity_at < cutoff {
                session.expire();
                // Keep the tombstone for one more threshold so late
                // arrivals see a clear "expired" rather than "unknown"
                session.touch();
                retired.push(session.thread_id.clone());
            }
        }

        // Tombstones older than another full threshold are evicted outright
        sessions
            .retain(|_, s| !(s.status == SessionStatus::Expired && s.last_activity_at < cutoff));

        Ok(retired)
    }
}
