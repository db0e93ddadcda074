//! # askdb-core
//!
//! Core types and abstractions for AskDB - the conversational NL-to-SQL backend.
//!
//! This crate provides:
//! - Session record and status state machine
//! - Wire protocol request/response shapes
//! - Schema context handed to the reasoning engine
//! - Configuration system
//! - Common error types

pub mod config;
pub mod error;
pub mod protocol;
pub mod schema;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{HumanChoice, ResultSet, TurnKind, TurnRequest, TurnResponse};
pub use schema::SchemaContext;
pub use session::{Session, SessionStatus};
