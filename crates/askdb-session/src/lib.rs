//! # askdb-session
//!
//! Session store, manager and expiry for AskDB.
//!
//! This crate implements the interruptible query-session protocol:
//! - [`store::SessionStore`] - durable lookup and compare-and-swap updates
//!   keyed by thread id, with memory and SQLite backends
//! - [`manager::SessionManager`] - orchestrates one logical query across
//!   round-trips: creation, suspension on ambiguity, resumption, expiry
//! - [`expiry::ExpirySweeper`] - background task retiring idle sessions
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use askdb_session::{manager::SessionManager, store::MemorySessionStore};
//!
//! let store = Arc::new(MemorySessionStore::new());
//! let manager = SessionManager::new(store, engine, schema, timeout);
//!
//! let turn = manager.submit_query(None, "Show me recent orders").await?;
//! // turn.outcome is an interruption; answer it on the same thread id
//! let turn = manager.submit_answer(&turn.thread_id, &choice).await?;
//! ```

pub mod expiry;
pub mod manager;
pub mod sqlite;
pub mod store;

pub use expiry::ExpirySweeper;
pub use manager::{SessionManager, TurnOutcome};
pub use sqlite::SqliteSessionStore;
pub use store::{MemorySessionStore, SessionStore, StoreError};
