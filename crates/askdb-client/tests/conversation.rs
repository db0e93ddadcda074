//! Client driver against an in-process gateway.

use std::sync::Arc;
use std::time::Duration;

use askdb_client::{ClientError, QueryClient};
use askdb_core::{SchemaContext, TurnKind};
use askdb_engine::ScriptedEngine;
use askdb_server::{app, AppState};
use askdb_session::{MemorySessionStore, SessionManager};

async fn spawn_gateway() -> String {
    let manager = Arc::new(SessionManager::new(
        Arc::new(MemorySessionStore::new()),
        Arc::new(ScriptedEngine::new()),
        SchemaContext::music_store(),
        Duration::from_secs(5),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app(AppState::new(manager)))
            .await
            .expect("serve");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_full_conversation_flow() {
    let base = spawn_gateway().await;
    let mut client = QueryClient::new(base);

    let turn = client
        .send("How many customers are from Brazil?")
        .await
        .expect("first turn");
    assert_eq!(turn.kind, TurnKind::Answer);
    assert!(!client.is_awaiting());
    let thread_id = client.thread_id().expect("thread id").to_string();

    // Ambiguous question suspends the conversation
    let turn = client.send("Show me recent orders").await.expect("query");
    assert_eq!(turn.kind, TurnKind::Interruption);
    assert!(client.is_awaiting());
    assert_eq!(client.thread_id(), Some(thread_id.as_str()));
    assert_eq!(turn.mcq_options.expect("options").len(), 2);

    // A numbered reply resolves the pending question
    let turn = client.send("2").await.expect("answer");
    assert_eq!(turn.kind, TurnKind::Answer);
    assert!(!client.is_awaiting());
    assert!(turn.sql.expect("sql").contains("2013"));
}

#[tokio::test]
async fn test_gateway_rejection_leaves_state_intact() {
    let base = spawn_gateway().await;
    let mut client = QueryClient::new(base.clone());

    client.send("Show me recent orders").await.expect("query");
    assert!(client.is_awaiting());
    let thread_id = client.thread_id().expect("thread id").to_string();

    // Drive a conflicting new query around the driver's routing
    let mut side_channel = QueryClient::resume(base, thread_id.clone());
    let err = side_channel
        .send("Count the albums instead")
        .await
        .expect_err("conflict");
    match &err {
        ClientError::Gateway { status, .. } => assert_eq!(*status, 409),
        other => panic!("expected gateway error, got {other:?}"),
    }
    assert!(!err.is_retryable());

    // The rejected handle did not adopt any conversation state
    assert!(side_channel.thread_id().is_some());
    assert!(!side_channel.is_awaiting());

    // The original handle still answers normally
    let turn = client.send("1").await.expect("answer");
    assert_eq!(turn.kind, TurnKind::Answer);
}

#[tokio::test]
async fn test_transport_failure_is_retryable_and_stateless() {
    // Nothing listens here
    let mut client = QueryClient::new("http://127.0.0.1:1");

    let err = client.send("anything").await.expect_err("unreachable");
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(err.is_retryable());
    assert!(err.system_message().contains("couldn't reach"));
    assert!(client.thread_id().is_none());
    assert!(!client.is_awaiting());
}

#[tokio::test]
async fn test_reset_starts_a_new_conversation() {
    let base = spawn_gateway().await;
    let mut client = QueryClient::new(base);

    client
        .send("How many customers are from Brazil?")
        .await
        .expect("first turn");
    let first = client.thread_id().expect("thread id").to_string();

    client.reset().await;
    assert!(client.thread_id().is_none());

    client
        .send("How many customers are from Brazil?")
        .await
        .expect("second conversation");
    assert_ne!(client.thread_id().expect("thread id"), first);
}
