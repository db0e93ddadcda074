//! Session manager: orchestrates one logical query across round-trips.
//!
//! Every inbound turn is validated against the session's current status,
//! handed to the reasoning engine with the right context, and the
//! resulting transition is committed atomically through the store's
//! compare-and-swap. The engine call is the only suspension point; state
//! is committed strictly after it returns, so a timed-out or failed call
//! leaves the session at its prior committed status.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use askdb_core::{Error, HumanChoice, Result, SchemaContext, Session, SessionStatus};
use askdb_engine::{EngineOutcome, EngineRequest, ReasoningEngine};

use crate::store::{SessionStore, StoreError};

/// Result of one committed turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Thread id the client must echo on the next turn. Fresh when the
    /// inbound id was absent, unknown or expired.
    pub thread_id: String,
    /// What the engine produced and the session committed
    pub outcome: EngineOutcome,
}

/// Orchestrates session creation, suspension, resumption and reset.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn ReasoningEngine>,
    schema: SchemaContext,
    engine_timeout: Duration,
    /// Thread ids with a turn currently talking to the engine
    in_flight: Mutex<HashSet<String>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        engine: Arc<dyn ReasoningEngine>,
        schema: SchemaContext,
        engine_timeout: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            schema,
            engine_timeout,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Submit a new natural-language query.
    ///
    /// An absent, unknown or expired thread id starts a fresh session. A
    /// session awaiting a human answer rejects new queries outright; the
    /// answer must go through [`submit_answer`](Self::submit_answer).
    #[instrument(skip(self, text))]
    pub async fn submit_query(&self, thread_id: Option<&str>, text: &str) -> Result<TurnOutcome> {
        let session = self.resolve_query_session(thread_id).await?;
        let thread_id = session.thread_id.clone();
        let _guard = self.acquire(&thread_id)?;

        let request = EngineRequest::NewQuery {
            text: text.to_string(),
            schema: self.schema.clone(),
        };
        let outcome = self.call_engine(request).await?;

        self.commit(&thread_id, session.status, text, &outcome)
            .await?;
        Ok(TurnOutcome { thread_id, outcome })
    }

    /// Answer a pending interruption.
    ///
    /// Requires the session to be awaiting human input. The choice is
    /// resolved against the stored options (1-based index to option text,
    /// anything else passes through as free text) and replayed to the
    /// engine together with the original query and the opaque context the
    /// engine handed back when it suspended.
    #[instrument(skip(self, choice))]
    pub async fn submit_answer(&self, thread_id: &str, choice: &HumanChoice) -> Result<TurnOutcome> {
        let session = self.get_live(thread_id).await?;
        if !session.is_awaiting() {
            return Err(Error::ProtocolViolation(format!(
                "session {thread_id} has no pending interruption; send a new query instead"
            )));
        }

        let _guard = self.acquire(thread_id)?;

        let original_query = session.original_query.clone().ok_or_else(|| {
            Error::ProtocolViolation(format!("session {thread_id} lost its suspended query"))
        })?;
        let context = session.interruption_context.clone().ok_or_else(|| {
            Error::ProtocolViolation(format!("session {thread_id} lost its suspended context"))
        })?;
        let resolved = choice.resolve(&session.mcq_options);
        debug!(choice = %resolved, "resolved human choice");

        let request = EngineRequest::Resume {
            original_query: original_query.clone(),
            context,
            choice: resolved,
            schema: self.schema.clone(),
        };
        let outcome = self.call_engine(request).await?;

        self.commit(thread_id, session.status, &original_query, &outcome)
            .await?;
        Ok(TurnOutcome {
            thread_id: thread_id.to_string(),
            outcome,
        })
    }

    /// Client-initiated reset: retire the session immediately.
    pub async fn reset(&self, thread_id: &str) -> Result<()> {
        info!(thread_id, "resetting session");
        self.store
            .expire(thread_id)
            .await
            .map_err(map_store_error)
    }

    /// Find or create the session a new query belongs to.
    async fn resolve_query_session(&self, thread_id: Option<&str>) -> Result<Session> {
        let Some(id) = thread_id else {
            return self.create_session().await;
        };

        match self.store.get(id).await {
            Ok(session) if session.is_awaiting() => Err(Error::ProtocolViolation(format!(
                "session {id} is awaiting a human answer; answer it before asking a new question"
            ))),
            Ok(session) if session.status == SessionStatus::Expired => {
                // Retired ids are never reused; start over
                debug!(thread_id = id, "query against expired session, starting fresh");
                self.create_session().await
            }
            Ok(session) => Ok(session),
            Err(StoreError::NotFound(_)) => {
                debug!(thread_id = id, "unknown thread id, starting fresh");
                self.create_session().await
            }
            Err(e) => Err(map_store_error(e)),
        }
    }

    async fn create_session(&self) -> Result<Session> {
        let session = self.store.create().await.map_err(map_store_error)?;
        info!(thread_id = %session.thread_id, "created session");
        Ok(session)
    }

    /// Get a session that must already exist for this turn to make sense.
    async fn get_live(&self, thread_id: &str) -> Result<Session> {
        let session = self
            .store
            .get(thread_id)
            .await
            .map_err(map_store_error)?;
        if session.status == SessionStatus::Expired {
            return Err(Error::SessionExpired(thread_id.to_string()));
        }
        Ok(session)
    }

    /// Run one engine call under the configured timeout.
    async fn call_engine(&self, request: EngineRequest) -> Result<EngineOutcome> {
        match tokio::time::timeout(self.engine_timeout, self.engine.resolve(request)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(e)) => {
                warn!(error = %e, "reasoning engine failed");
                Err(Error::EngineFailure(e.to_string()))
            }
            Err(_) => {
                warn!(timeout = ?self.engine_timeout, "reasoning engine timed out");
                Err(Error::EngineFailure(format!(
                    "reasoning call exceeded {:?}",
                    self.engine_timeout
                )))
            }
        }
    }

    /// Commit the transition for an engine outcome via compare-and-swap.
    async fn commit(
        &self,
        thread_id: &str,
        expected: SessionStatus,
        query: &str,
        outcome: &EngineOutcome,
    ) -> Result<()> {
        let mutator: crate::store::Mutator = match outcome {
            EngineOutcome::Answer(_) => Box::new(|s: &mut Session| s.complete()),
            EngineOutcome::Interruption(interruption) => {
                let context = interruption.context.clone();
                let options = interruption.mcq_options.clone();
                let query = query.to_string();
                let resuming = expected == SessionStatus::AwaitingHumanInput;
                Box::new(move |s: &mut Session| {
                    if resuming {
                        s.suspend_again(context, options);
                    } else {
                        s.suspend(query, context, options);
                    }
                })
            }
        };

        self.store
            .update(thread_id, expected, mutator)
            .await
            .map_err(map_store_error)?;
        Ok(())
    }

    /// Mark a session in flight, or fail with `SessionBusy`.
    fn acquire(&self, thread_id: &str) -> Result<FlightGuard<'_>> {
        let mut in_flight = self.in_flight.lock();
        if !in_flight.insert(thread_id.to_string()) {
            return Err(Error::SessionBusy(thread_id.to_string()));
        }
        Ok(FlightGuard {
            manager: self,
            thread_id: thread_id.to_string(),
        })
    }
}

/// Releases the in-flight slot when the turn finishes, on any path.
struct FlightGuard<'a> {
    manager: &'a SessionManager,
    thread_id: String,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.manager.in_flight.lock().remove(&self.thread_id);
    }
}

fn map_store_error(e: StoreError) -> Error {
    match e {
        StoreError::NotFound(id) => Error::SessionNotFound(id),
        StoreError::Conflict { thread_id, .. } => Error::Conflict(thread_id),
        StoreError::Database(e) => Error::Database(e.to_string()),
        StoreError::Serialization(e) => Error::Json(e),
        StoreError::Io(e) => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;

    use askdb_engine::{AnswerPayload, InterruptionPayload, ScriptedEngine};

    use crate::store::MemorySessionStore;

    fn scripted_manager() -> SessionManager {
        SessionManager::new(
            Arc::new(MemorySessionStore::new()),
            Arc::new(ScriptedEngine::new()),
            SchemaContext::music_store(),
            Duration::from_secs(5),
        )
    }

    fn interruption(outcome: &EngineOutcome) -> &InterruptionPayload {
        match outcome {
            EngineOutcome::Interruption(i) => i,
            EngineOutcome::Answer(_) => panic!("expected interruption"),
        }
    }

    fn answer(outcome: &EngineOutcome) -> &AnswerPayload {
        match outcome {
            EngineOutcome::Answer(a) => a,
            EngineOutcome::Interruption(_) => panic!("expected answer"),
        }
    }

    /// Engine double that records the request it was given.
    struct RecordingEngine {
        seen: Mutex<Vec<EngineRequest>>,
        outcome: EngineOutcome,
    }

    impl RecordingEngine {
        fn answering(content: &str) -> Self {
            Self {
                seen: Mutex::new(vec![]),
                outcome: EngineOutcome::Answer(AnswerPayload {
                    content: content.to_string(),
                    ..Default::default()
                }),
            }
        }
    }

    #[async_trait]
    impl ReasoningEngine for RecordingEngine {
        fn id(&self) -> &str {
            "recording"
        }
        fn name(&self) -> &str {
            "Recording"
        }
        async fn resolve(&self, request: EngineRequest) -> anyhow::Result<EngineOutcome> {
            self.seen.lock().push(request);
            Ok(self.outcome.clone())
        }
    }

    /// Engine double that holds every call until told to finish.
    struct SlowEngine {
        delay: Duration,
    }

    #[async_trait]
    impl ReasoningEngine for SlowEngine {
        fn id(&self) -> &str {
            "slow"
        }
        fn name(&self) -> &str {
            "Slow"
        }
        async fn resolve(&self, _request: EngineRequest) -> anyhow::Result<EngineOutcome> {
            tokio::time::sleep(self.delay).await;
            Ok(EngineOutcome::Answer(AnswerPayload {
                content: "done".to_string(),
                ..Default::default()
            }))
        }
    }

    /// Engine double that always fails.
    struct FailingEngine;

    #[async_trait]
    impl ReasoningEngine for FailingEngine {
        fn id(&self) -> &str {
            "failing"
        }
        fn name(&self) -> &str {
            "Failing"
        }
        async fn resolve(&self, _request: EngineRequest) -> anyhow::Result<EngineOutcome> {
            anyhow::bail!("reasoning backend unavailable")
        }
    }

    #[tokio::test]
    async fn test_first_turn_assigns_fresh_id() {
        let manager = scripted_manager();

        let a = manager
            .submit_query(None, "How many customers are from Brazil?")
            .await
            .unwrap();
        let b = manager
            .submit_query(None, "How many customers are from Brazil?")
            .await
            .unwrap();

        assert!(!a.thread_id.is_empty());
        assert_ne!(a.thread_id, b.thread_id);
        assert_eq!(
            answer(&a.outcome).data.as_ref().unwrap().rows,
            vec![vec!["5".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_interruption_round_trip_completes_session() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(ScriptedEngine::new()),
            SchemaContext::music_store(),
            Duration::from_secs(5),
        );

        let turn = manager
            .submit_query(None, "Show me recent orders")
            .await
            .unwrap();
        assert_eq!(interruption(&turn.outcome).mcq_options.len(), 2);

        let session = store.get(&turn.thread_id).await.unwrap();
        assert!(session.is_awaiting());
        assert!(session.suspension_consistent());

        // Option 2 is "Last year (2013)"
        let done = manager
            .submit_answer(&turn.thread_id, &HumanChoice::Index(2))
            .await
            .unwrap();
        assert_eq!(done.thread_id, turn.thread_id);
        let payload = answer(&done.outcome);
        assert!(payload.sql.as_ref().unwrap().contains("2013"));
        assert_eq!(
            payload.data.as_ref().unwrap().rows,
            vec![vec!["450.58".to_string()]]
        );

        let session = store.get(&turn.thread_id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.suspension_consistent());
    }

    #[tokio::test]
    async fn test_choice_index_resolves_to_option_text() {
        let store = Arc::new(MemorySessionStore::new());
        let engine = Arc::new(RecordingEngine::answering("ok"));
        let manager = SessionManager::new(
            store.clone(),
            engine.clone(),
            SchemaContext::default(),
            Duration::from_secs(5),
        );

        // Plant a suspended session with known options
        let session = store.create().await.unwrap();
        store
            .update(
                &session.thread_id,
                SessionStatus::Idle,
                Box::new(|s| s.suspend("q", json!({"k": 1}), vec!["A".into(), "B".into()])),
            )
            .await
            .unwrap();

        manager
            .submit_answer(&session.thread_id, &HumanChoice::Index(1))
            .await
            .unwrap();

        let seen = engine.seen.lock();
        match &seen[0] {
            EngineRequest::Resume {
                choice,
                context,
                original_query,
                ..
            } => {
                assert_eq!(choice, "A");
                assert_eq!(original_query, "q");
                assert_eq!(context["k"], 1);
            }
            other => panic!("expected resume request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_new_query_while_awaiting_is_protocol_violation() {
        let manager = scripted_manager();
        let turn = manager
            .submit_query(None, "Show me recent orders")
            .await
            .unwrap();

        let err = manager
            .submit_query(Some(&turn.thread_id), "Actually, count albums")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_answer_without_interruption_is_protocol_violation() {
        let manager = scripted_manager();
        let turn = manager
            .submit_query(None, "How many customers are from Brazil?")
            .await
            .unwrap();

        let err = manager
            .submit_answer(&turn.thread_id, &HumanChoice::Index(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_completed_session_accepts_followup_query() {
        let manager = scripted_manager();
        let first = manager
            .submit_query(None, "How many customers are from Brazil?")
            .await
            .unwrap();

        let second = manager
            .submit_query(Some(&first.thread_id), "Which artists have the most tracks?")
            .await
            .unwrap();
        assert_eq!(second.thread_id, first.thread_id);
        assert!(matches!(second.outcome, EngineOutcome::Answer(_)));
    }

    #[tokio::test]
    async fn test_concurrent_answers_one_wins_one_busy() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            Arc::new(SlowEngine {
                delay: Duration::from_millis(200),
            }),
            SchemaContext::default(),
            Duration::from_secs(5),
        ));

        let session = store.create().await.unwrap();
        store
            .update(
                &session.thread_id,
                SessionStatus::Idle,
                Box::new(|s| s.suspend("q", json!({}), vec!["A".into(), "B".into()])),
            )
            .await
            .unwrap();

        let m1 = manager.clone();
        let m2 = manager.clone();
        let id1 = session.thread_id.clone();
        let id2 = session.thread_id.clone();

        let t1 = tokio::spawn(async move { m1.submit_answer(&id1, &HumanChoice::Index(1)).await });
        // Give the first turn time to reach the engine call
        tokio::time::sleep(Duration::from_millis(50)).await;
        let t2 = tokio::spawn(async move { m2.submit_answer(&id2, &HumanChoice::Index(2)).await });

        let r1 = t1.await.unwrap();
        let r2 = t2.await.unwrap();

        assert!(r1.is_ok(), "first turn should commit: {r1:?}");
        assert!(
            matches!(r2, Err(Error::SessionBusy(_))),
            "second turn should observe busy: {r2:?}"
        );

        let committed = store.get(&session.thread_id).await.unwrap();
        assert_eq!(committed.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn test_engine_timeout_rolls_back_to_prior_status() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(SlowEngine {
                delay: Duration::from_secs(60),
            }),
            SchemaContext::default(),
            Duration::from_millis(50),
        );

        let session = store.create().await.unwrap();
        store
            .update(
                &session.thread_id,
                SessionStatus::Idle,
                Box::new(|s| s.suspend("q", json!({}), vec!["A".into()])),
            )
            .await
            .unwrap();

        let err = manager
            .submit_answer(&session.thread_id, &HumanChoice::Index(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineFailure(_)));

        // Prior committed status is intact and the turn can be retried
        let after = store.get(&session.thread_id).await.unwrap();
        assert!(after.is_awaiting());
        assert!(after.suspension_consistent());
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_session_retryable() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(FailingEngine),
            SchemaContext::default(),
            Duration::from_secs(5),
        );

        let err = manager.submit_query(None, "anything").await.unwrap_err();
        assert!(matches!(err, Error::EngineFailure(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_expired_session_rejects_answer_and_refreshes_query() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(ScriptedEngine::new()),
            SchemaContext::music_store(),
            Duration::from_secs(5),
        );

        let turn = manager
            .submit_query(None, "Show me recent orders")
            .await
            .unwrap();
        store.sweep_idle(Duration::from_secs(0)).await.unwrap();

        let err = manager
            .submit_answer(&turn.thread_id, &HumanChoice::Index(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));

        // A query against the retired id transparently gets a fresh session
        let fresh = manager
            .submit_query(Some(&turn.thread_id), "How many customers are from Brazil?")
            .await
            .unwrap();
        assert_ne!(fresh.thread_id, turn.thread_id);
    }

    #[tokio::test]
    async fn test_further_interruption_preserves_original_query() {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(ScriptedEngine::new()),
            SchemaContext::music_store(),
            Duration::from_secs(5),
        );

        let turn = manager
            .submit_query(None, "Show me recent orders")
            .await
            .unwrap();

        // A free-text answer the engine cannot map suspends again
        let again = manager
            .submit_answer(&turn.thread_id, &HumanChoice::Text("whenever".into()))
            .await
            .unwrap();
        assert!(matches!(again.outcome, EngineOutcome::Interruption(_)));

        let session = store.get(&turn.thread_id).await.unwrap();
        assert!(session.is_awaiting());
        assert_eq!(
            session.original_query.as_deref(),
            Some("Show me recent orders")
        );
        assert!(session.suspension_consistent());
    }

    #[tokio::test]
    async fn test_reset_retires_session() {
        let manager = scripted_manager();
        let turn = manager
            .submit_query(None, "How many customers are from Brazil?")
            .await
            .unwrap();

        manager.reset(&turn.thread_id).await.unwrap();

        let err = manager
            .submit_answer(&turn.thread_id, &HumanChoice::Index(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionExpired(_)));
    }
}
