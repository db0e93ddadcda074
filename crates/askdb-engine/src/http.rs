//! HTTP client for a remote reasoning service.
//!
//! The service speaks a small JSON contract on `POST /resolve`: it receives
//! the serialized [`EngineRequest`] (query or resume, plus the compact
//! schema summary) and replies with a tagged answer-or-interruption body
//! matching [`EngineOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error, instrument};

use crate::traits::{EngineOutcome, EngineRequest, ReasoningEngine};

/// Remote reasoning engine over HTTP.
pub struct HttpEngine {
    client: Client,
    base_url: String,
}

/// Wire body sent to the reasoning service.
#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    query: &'a str,
    schema_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    human_choice: Option<&'a str>,
}

impl HttpEngine {
    /// Create a new engine client for the given service URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(120))
    }

    /// Create with an explicit request timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn wire_body<'a>(request: &'a EngineRequest) -> ResolveRequest<'a> {
        match request {
            EngineRequest::NewQuery { text, schema } => ResolveRequest {
                query: text,
                schema_summary: schema.summary(),
                context: None,
                human_choice: None,
            },
            EngineRequest::Resume {
                original_query,
                context,
                choice,
                schema,
            } => ResolveRequest {
                query: original_query,
                schema_summary: schema.summary(),
                context: Some(context),
                human_choice: Some(choice),
            },
        }
    }
}

#[async_trait]
impl ReasoningEngine for HttpEngine {
    fn id(&self) -> &str {
        "http"
    }

    fn name(&self) -> &str {
        "Remote reasoning service"
    }

    #[instrument(skip(self, request), fields(query = %request.query_text()))]
    async fn resolve(&self, request: EngineRequest) -> anyhow::Result<EngineOutcome> {
        let body = Self::wire_body(&request);
        debug!("Sending request to reasoning service");

        let response = self
            .client
            .post(format!("{}/resolve", self.base_url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Reasoning service error: {} - {}", status, error_text);
            anyhow::bail!("Reasoning service error: {} - {}", status, error_text);
        }

        let outcome: EngineOutcome = response.json().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::SchemaContext;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let engine = HttpEngine::new("http://localhost:9000/");
        assert_eq!(engine.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_resume_body_carries_context_and_choice() {
        let request = EngineRequest::Resume {
            original_query: "Show me recent orders".into(),
            context: json!({"step": "temporal"}),
            choice: "Last year (2013)".into(),
            schema: SchemaContext::music_store(),
        };
        let body = HttpEngine::wire_body(&request);
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["query"], "Show me recent orders");
        assert_eq!(value["context"]["step"], "temporal");
        assert_eq!(value["human_choice"], "Last year (2013)");
        assert!(value["schema_summary"].as_str().unwrap().contains("invoice"));
    }

    #[test]
    fn test_new_query_body_omits_resume_fields() {
        let request = EngineRequest::NewQuery {
            text: "How many customers are from Brazil?".into(),
            schema: SchemaContext::music_store(),
        };
        let value = serde_json::to_value(HttpEngine::wire_body(&request)).unwrap();
        assert!(value.get("context").is_none());
        assert!(value.get("human_choice").is_none());
    }
}
