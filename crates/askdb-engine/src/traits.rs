//! Reasoning engine trait definitions.

use askdb_core::{ResultSet, SchemaContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One reasoning invocation.
///
/// Either a fresh question, or the resumption of a suspended one with the
/// human's disambiguation. The context in `Resume` is exactly what the
/// engine handed back in a previous [`InterruptionPayload`]; the session
/// layer stores it opaquely and replays it here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineRequest {
    /// First reasoning step for a natural-language question
    NewQuery {
        text: String,
        schema: SchemaContext,
    },
    /// Resume a suspended reasoning step with the resolved human choice
    Resume {
        original_query: String,
        context: serde_json::Value,
        choice: String,
        schema: SchemaContext,
    },
}

impl EngineRequest {
    /// The question this invocation is ultimately answering.
    pub fn query_text(&self) -> &str {
        match self {
            EngineRequest::NewQuery { text, .. } => text,
            EngineRequest::Resume { original_query, .. } => original_query,
        }
    }
}

/// Final answer produced by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnswerPayload {
    /// Human-readable answer text
    pub content: String,
    /// Reasoning trace
    #[serde(default)]
    pub reasoning: Vec<String>,
    /// Generated SQL, if the answer required any
    #[serde(default)]
    pub sql: Option<String>,
    /// Result rows, if the answer required execution
    #[serde(default)]
    pub data: Option<ResultSet>,
}

/// Suspension raised by the engine: a question for the human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptionPayload {
    /// Clarifying question to surface
    pub question: String,
    /// Enumerated choices; empty means free-text answer expected
    #[serde(default)]
    pub mcq_options: Vec<String>,
    /// Opaque state describing where reasoning paused; replayed verbatim
    /// on resume
    pub context: serde_json::Value,
}

/// Result of one reasoning invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineOutcome {
    /// Reasoning finished with a final answer
    Answer(AnswerPayload),
    /// Reasoning is suspended pending human disambiguation
    Interruption(InterruptionPayload),
}

/// Core reasoning trait - all engine backends implement this.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Engine identifier.
    fn id(&self) -> &str;

    /// Human-readable name.
    fn name(&self) -> &str;

    /// Run one reasoning step to completion or suspension.
    async fn resolve(&self, request: EngineRequest) -> anyhow::Result<EngineOutcome>;
}
