//! # askdb-server
//!
//! HTTP gateway for the AskDB query session protocol.
//!
//! A single `POST /query` endpoint carries every turn of a conversation:
//! new questions, answers to pending clarifying questions, and the
//! transparent restart of expired conversations. `GET /health` reports
//! liveness.

pub mod routes;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;

use askdb_session::SessionManager;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

/// Build the gateway router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/query", post(routes::submit_turn))
        .route("/sessions/{thread_id}", delete(routes::reset_session))
        .route("/health", get(routes::health))
        .with_state(state)
}
