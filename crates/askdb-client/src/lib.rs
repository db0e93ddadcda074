//! # askdb-client
//!
//! Client driver for the AskDB query session protocol.
//!
//! [`QueryClient`] is a stateful conversation handle: it remembers the
//! gateway-assigned `thread_id` and whether the last turn left a clarifying
//! question pending, so callers just feed it user input. While a question
//! is pending, input is sent as a `human_choice`; otherwise it is sent as a
//! new query. Failed turns leave the handle untouched, so the same input
//! can simply be sent again.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use askdb_core::{HumanChoice, TurnKind, TurnRequest, TurnResponse};

/// Errors surfaced to the embedding application.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The gateway was unreachable or the response was unreadable.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway rejected the turn.
    #[error("Gateway rejected the turn ({status}): {message}")]
    Gateway {
        status: u16,
        message: String,
        retryable: bool,
        suggestion: Option<String>,
    },
}

impl ClientError {
    /// Whether resending the same input may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(_) => true,
            ClientError::Gateway { retryable, .. } => *retryable,
        }
    }

    /// Chat-ready system text describing the failure.
    ///
    /// Synthesized locally; carries no thread id, SQL or data, since none
    /// of those exist for a turn that never committed.
    pub fn system_message(&self) -> String {
        match self {
            ClientError::Transport(_) => {
                "Sorry, I couldn't reach the query service. \
                 Please check the connection and try again."
                    .to_string()
            }
            ClientError::Gateway {
                message,
                suggestion: Some(suggestion),
                ..
            } => format!("{message}. {suggestion}."),
            ClientError::Gateway { message, .. } => message.clone(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Error body the gateway returns on non-success statuses.
#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    retryable: bool,
    #[serde(default)]
    suggestion: Option<String>,
}

/// One conversation with an AskDB gateway.
pub struct QueryClient {
    http: reqwest::Client,
    base_url: String,
    thread_id: Option<String>,
    awaiting: bool,
    last_query: String,
}

impl QueryClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            thread_id: None,
            awaiting: false,
            last_query: String::new(),
        }
    }

    /// Reattach to a known conversation, e.g. one persisted across a
    /// process restart. If the gateway has since expired it, the next
    /// query transparently starts fresh.
    pub fn resume(base_url: impl Into<String>, thread_id: impl Into<String>) -> Self {
        let mut client = Self::new(base_url);
        client.thread_id = Some(thread_id.into());
        client
    }

    /// The gateway-assigned conversation id, once a turn has succeeded.
    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    /// Whether the next input answers a pending clarifying question.
    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    /// Send one piece of user input and advance the conversation.
    ///
    /// The handle's state moves only on success; a failed turn can be
    /// retried verbatim.
    pub async fn send(&mut self, input: &str) -> Result<TurnResponse> {
        let request = self.build_request(input);
        debug!(
            thread_id = ?request.thread_id,
            answering = request.is_answer(),
            "sending turn"
        );

        let response = self
            .http
            .post(format!("{}/query", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: GatewayError = response.json().await.unwrap_or(GatewayError {
                error: status.to_string(),
                retryable: false,
                suggestion: None,
            });
            return Err(ClientError::Gateway {
                status: status.as_u16(),
                message: body.error,
                retryable: body.retryable,
                suggestion: body.suggestion,
            });
        }

        let turn: TurnResponse = response.json().await?;
        self.thread_id = Some(turn.thread_id.clone());
        self.awaiting = turn.kind == TurnKind::Interruption;
        if !request.is_answer() {
            self.last_query = request.query;
        }
        Ok(turn)
    }

    /// End the conversation and start fresh on the next `send`.
    ///
    /// Tells the gateway to retire the session, best effort; an
    /// unreachable gateway still resets the local handle, since the idle
    /// sweep will retire the session anyway.
    pub async fn reset(&mut self) {
        if let Some(thread_id) = self.thread_id.take() {
            let outcome = self
                .http
                .delete(format!("{}/sessions/{thread_id}", self.base_url))
                .send()
                .await;
            if let Err(e) = outcome {
                debug!(error = %e, "session reset not delivered");
            }
        }
        self.awaiting = false;
        self.last_query.clear();
    }

    fn build_request(&self, input: &str) -> TurnRequest {
        if self.awaiting && self.thread_id.is_some() {
            let choice = match input.trim().parse::<i64>() {
                Ok(n) => HumanChoice::Index(n),
                Err(_) => HumanChoice::Text(input.to_string()),
            };
            TurnRequest {
                // Carry the suspended question so an expired session can
                // restart from it transparently
                query: self.last_query.clone(),
                thread_id: self.thread_id.clone(),
                human_choice: Some(choice),
            }
        } else {
            TurnRequest {
                query: input.to_string(),
                thread_id: self.thread_id.clone(),
                human_choice: None,
            }
        }
    }
}
