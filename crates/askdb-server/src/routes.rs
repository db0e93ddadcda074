//! Request handlers and error-to-status mapping.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use askdb_core::{Error, TurnRequest, TurnResponse};
use askdb_engine::EngineOutcome;
use askdb_session::TurnOutcome;

use crate::AppState;

/// Gateway error wrapper carrying the HTTP mapping.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::ProtocolViolation(_) | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::SessionBusy(_) => StatusCode::TOO_MANY_REQUESTS,
            Error::SessionNotFound(_) | Error::SessionExpired(_) => StatusCode::GONE,
            Error::EngineFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        } else {
            debug!(error = %self.0, status = %status, "request rejected");
        }
        let body = json!({
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
            "suggestion": self.0.recovery_suggestion(),
        });
        (status, Json(body)).into_response()
    }
}

/// One conversation turn: a new query or an answer to an interruption.
///
/// An answer whose session is gone (unknown or expired thread id) falls
/// back to submitting the carried query as a fresh turn, so a client that
/// waited too long gets a new conversation instead of a dead end.
#[instrument(skip(state, request), fields(thread_id = ?request.thread_id))]
pub async fn submit_turn(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let outcome = match (&request.human_choice, request.thread_id.as_deref()) {
        (Some(choice), Some(thread_id)) => {
            match state.manager.submit_answer(thread_id, choice).await {
                Err(Error::SessionNotFound(_)) | Err(Error::SessionExpired(_)) => {
                    info!(thread_id, "session gone, restarting conversation");
                    state.manager.submit_query(None, &request.query).await?
                }
                other => other?,
            }
        }
        // An answer with no thread id cannot target anything; treat it
        // like any other turn without a conversation
        _ => {
            state
                .manager
                .submit_query(request.thread_id.as_deref(), &request.query)
                .await?
        }
    };

    Ok(Json(turn_response(outcome)))
}

/// Client-initiated reset: retire the conversation immediately.
///
/// Idempotent; resetting an unknown or already-retired session succeeds.
#[instrument(skip(state))]
pub async fn reset_session(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.manager.reset(&thread_id).await {
        Ok(()) | Err(Error::SessionNotFound(_)) | Err(Error::SessionExpired(_)) => {
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => Err(e.into()),
    }
}

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

fn turn_response(turn: TurnOutcome) -> TurnResponse {
    match turn.outcome {
        EngineOutcome::Answer(answer) => {
            let mut response =
                TurnResponse::answer(turn.thread_id, answer.content).with_reasoning(answer.reasoning);
            if let Some(sql) = answer.sql {
                response = response.with_sql(sql);
            }
            if let Some(data) = answer.data {
                response = response.with_data(data);
            }
            response
        }
        EngineOutcome::Interruption(interruption) => TurnResponse::interruption(
            turn.thread_id,
            interruption.question,
            interruption.mcq_options,
        ),
    }
}
