//! SQLite-backed session store.
//!
//! Durable backend for deployments that must survive restarts. The
//! compare-and-swap contract is enforced in SQL: the final UPDATE is
//! guarded by `AND status = ?`, so a racing writer that already moved the
//! session simply matches zero rows.

use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use askdb_core::{Session, SessionStatus};

use crate::store::{Mutator, Result, SessionStore, StoreError};

/// SQLite-backed session storage.
pub struct SqliteSessionStore {
    /// Database connection (wrapped in mutex for thread safety).
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Create a new SQLite session store.
    ///
    /// Creates the database and runs migrations if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let db_path = base_dir.join("sessions.db");
        let conn = Connection::open(&db_path)?;

        // WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open store at the default data directory.
    pub fn open_default() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("askdb");
        Self::new(data_dir)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            let migration = include_str!("../migrations/001_initial.sql");
            conn.execute_batch(migration)?;
        }

        Ok(())
    }

    fn status_to_str(status: SessionStatus) -> &'static str {
        match status {
            SessionStatus::Idle => "idle",
            SessionStatus::AwaitingHumanInput => "awaiting_human_input",
            SessionStatus::Completed => "completed",
            SessionStatus::Expired => "expired",
        }
    }

    fn str_to_status(s: &str) -> SessionStatus {
        match s {
            "awaiting_human_input" => SessionStatus::AwaitingHumanInput,
            "completed" => SessionStatus::Completed,
            "expired" => SessionStatus::Expired,
            _ => SessionStatus::Idle,
        }
    }

    fn parse_datetime(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn format_datetime(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339()
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            thread_id: row.get(0)?,
            status: row.get(1)?,
            original_query: row.get(2)?,
            interruption_context: row.get(3)?,
            mcq_options: row.get(4)?,
            created_at: row.get(5)?,
            last_activity_at: row.get(6)?,
        })
    }

    fn select_session(conn: &Connection, thread_id: &str) -> Result<Session> {
        let row = conn
            .query_row(
                "SELECT thread_id, status, original_query, interruption_context, \
                 mcq_options, created_at, last_activity_at \
                 FROM sessions WHERE thread_id = ?1",
                params![thread_id],
                Self::row_to_session,
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(thread_id.to_string()))?;

        row.into_session()
    }

    fn persist(conn: &Connection, session: &Session, expected: Option<SessionStatus>) -> Result<usize> {
        let context_json = session
            .interruption_context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let options_json = serde_json::to_string(&session.mcq_options)?;

        let rows = match expected {
            Some(expected) => conn.execute(
                "UPDATE sessions SET status = ?2, original_query = ?3, \
                 interruption_context = ?4, mcq_options = ?5, last_activity_at = ?6 \
                 WHERE thread_id = ?1 AND status = ?7",
                params![
                    session.thread_id,
                    Self::status_to_str(session.status),
                    session.original_query,
                    context_json,
                    options_json,
                    Self::format_datetime(&session.last_activity_at),
                    Self::status_to_str(expected),
                ],
            )?,
            None => conn.execute(
                "UPDATE sessions SET status = ?2, original_query = ?3, \
                 interruption_context = ?4, mcq_options = ?5, last_activity_at = ?6 \
                 WHERE thread_id = ?1",
                params![
                    session.thread_id,
                    Self::status_to_str(session.status),
                    session.original_query,
                    context_json,
                    options_json,
                    Self::format_datetime(&session.last_activity_at),
                ],
            )?,
        };
        Ok(rows)
    }
}

/// Raw row shape before JSON fields are decoded.
struct SessionRow {
    thread_id: String,
    status: String,
    original_query: Option<String>,
    interruption_context: Option<String>,
    mcq_options: String,
    created_at: String,
    last_activity_at: String,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let interruption_context = self
            .interruption_context
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        let mcq_options = serde_json::from_str(&self.mcq_options)?;

        Ok(Session {
            thread_id: self.thread_id,
            status: SqliteSessionStore::str_to_status(&self.status),
            original_query: self.original_query,
            interruption_context,
            mcq_options,
            created_at: SqliteSessionStore::parse_datetime(&self.created_at),
            last_activity_at: SqliteSessionStore::parse_datetime(&self.last_activity_at),
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self) -> Result<Session> {
        let session = Session::new();
        let conn = self.conn.lock();

        conn.execute(
            "INSERT INTO sessions (thread_id, status, original_query, \
             interruption_context, mcq_options, created_at, last_activity_at) \
             VALUES (?1, ?2, NULL, NULL, '[]', ?3, ?4)",
            params![
                session.thread_id,
                Self::status_to_str(session.status),
                Self::format_datetime(&session.created_at),
                Self::format_datetime(&session.last_activity_at),
            ],
        )?;

        Ok(session)
    }

    async fn get(&self, thread_id: &str) -> Result<Session> {
        let conn = self.conn.lock();
        Self::select_session(&conn, thread_id)
    }

    async fn update(
        &self,
        thread_id: &str,
        expected: SessionStatus,
        mutator: Mutator,
    ) -> Result<Session> {
        let conn = self.conn.lock();
        let mut session = Self::select_session(&conn, thread_id)?;

        if session.status != expected {
            return Err(StoreError::Conflict {
                thread_id: thread_id.to_string(),
                expected,
                actual: session.status,
            });
        }

        mutator(&mut session);

        // Guarded write: zero rows means a concurrent writer won the race
        let rows = Self::persist(&conn, &session, Some(expected))?;
        if rows == 0 {
            let actual = Self::select_session(&conn, thread_id)?.status;
            return Err(StoreError::Conflict {
                thread_id: thread_id.to_string(),
                expected,
                actual,
            });
        }

        Ok(session)
    }

    async fn expire(&self, thread_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let mut session = Self::select_session(&conn, thread_id)?;
        session.expire();
        Self::persist(&conn, &session, None)?;
        Ok(())
    }

    async fn sweep_idle(&self, threshold: Duration) -> Result<Vec<String>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::zero());
        let cutoff_str = Self::format_datetime(&cutoff);
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT thread_id FROM sessions \
             WHERE status != 'expired' AND last_activity_at < ?1",
        )?;
        let retired: Vec<String> = stmt
            .query_map(params![cutoff_str], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        // Retire, clear suspension state, and restamp so the tombstone
        // survives one more threshold before eviction
        conn.execute(
            "UPDATE sessions SET status = 'expired', original_query = NULL, \
             interruption_context = NULL, mcq_options = '[]', last_activity_at = ?2 \
             WHERE status != 'expired' AND last_activity_at < ?1",
            params![cutoff_str, Self::format_datetime(&Utc::now())],
        )?;

        conn.execute(
            "DELETE FROM sessions WHERE status = 'expired' AND last_activity_at < ?1",
            params![cutoff_str],
        )?;

        Ok(retired)
    }
}
