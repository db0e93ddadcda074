//! # askdb-engine
//!
//! Reasoning engine abstraction layer for AskDB.
//!
//! This crate provides:
//! - The [`ReasoningEngine`] trait the session manager depends on
//! - An HTTP client for a remote reasoning service
//! - A scripted engine with canned responses for tests and demo mode
//! - Engine selection from configuration

pub mod http;
pub mod registry;
pub mod scripted;
pub mod traits;

pub use http::HttpEngine;
pub use registry::engine_from_config;
pub use scripted::ScriptedEngine;
pub use traits::{
    AnswerPayload, EngineOutcome, EngineRequest, InterruptionPayload, ReasoningEngine,
};
