//! Scripted engine with canned pattern-matched responses.
//!
//! Stands in for the real reasoning service in tests and demo mode. It
//! covers the music-store sample questions, including the two ambiguity
//! flows: vague ranking terms ("top artists") and vague temporal terms
//! ("recent orders"), each suspending with a multiple-choice question.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use askdb_core::ResultSet;

use crate::traits::{
    AnswerPayload, EngineOutcome, EngineRequest, InterruptionPayload, ReasoningEngine,
};

/// Disambiguation steps the scripted engine can suspend on.
const STEP_TEMPORAL: &str = "temporal";
const STEP_RANKING: &str = "ranking";

/// Canned reasoning engine for the bundled music-store schema.
#[derive(Debug, Default, Clone)]
pub struct ScriptedEngine;

impl ScriptedEngine {
    pub fn new() -> Self {
        Self
    }

    fn answer_brazil() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "There are 5 customers from Brazil.".to_string(),
            reasoning: vec![
                "Identified entity 'customer'".to_string(),
                "Found column 'country' on the customer table".to_string(),
                "Filtering by country = 'Brazil' and counting".to_string(),
            ],
            sql: Some("SELECT count(*) FROM customer WHERE country = 'Brazil';".to_string()),
            data: Some(ResultSet {
                columns: vec!["Count".to_string()],
                rows: vec![vec!["5".to_string()]],
            }),
        })
    }

    fn answer_top_artists_by_tracks() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "Here are the top 5 artists with the most tracks:".to_string(),
            reasoning: vec![
                "Identified entities 'artist' and 'track'".to_string(),
                "Found relationship artist -> album -> track".to_string(),
                "Grouping by artist, counting tracks, limit 5".to_string(),
            ],
            sql: Some(
                "SELECT ar.name, COUNT(t.track_id) AS track_count\n\
                 FROM artist ar\n\
                 JOIN album al ON ar.artist_id = al.artist_id\n\
                 JOIN track t ON al.album_id = t.album_id\n\
                 GROUP BY ar.name\n\
                 ORDER BY track_count DESC\n\
                 LIMIT 5;"
                    .to_string(),
            ),
            data: Some(ResultSet {
                columns: vec!["Name".to_string(), "TrackCount".to_string()],
                rows: vec![
                    vec!["Iron Maiden".to_string(), "213".to_string()],
                    vec!["U2".to_string(), "135".to_string()],
                    vec!["Led Zeppelin".to_string(), "114".to_string()],
                    vec!["Metallica".to_string(), "112".to_string()],
                    vec!["Deep Purple".to_string(), "92".to_string()],
                ],
            }),
        })
    }

    fn answer_top_artists_by_revenue() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "Here are the top 5 artists by sales revenue:".to_string(),
            reasoning: vec![
                "Joining artist -> album -> track -> invoice_line".to_string(),
                "Summing line totals per artist, limit 5".to_string(),
            ],
            sql: Some(
                "SELECT ar.name, SUM(il.unit_price * il.quantity) AS revenue\n\
                 FROM artist ar\n\
                 JOIN album al ON ar.artist_id = al.artist_id\n\
                 JOIN track t ON al.album_id = t.album_id\n\
                 JOIN invoice_line il ON t.track_id = il.track_id\n\
                 GROUP BY ar.name\n\
                 ORDER BY revenue DESC\n\
                 LIMIT 5;"
                    .to_string(),
            ),
            data: Some(ResultSet {
                columns: vec!["Name".to_string(), "Revenue".to_string()],
                rows: vec![
                    vec!["Iron Maiden".to_string(), "138.60".to_string()],
                    vec!["U2".to_string(), "105.93".to_string()],
                    vec!["Metallica".to_string(), "90.09".to_string()],
                    vec!["Led Zeppelin".to_string(), "86.13".to_string()],
                    vec!["Lost".to_string(), "81.59".to_string()],
                ],
            }),
        })
    }

    fn answer_never_purchased() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "All customers in the database have made at least one purchase. \
                      There are no customers without an invoice."
                .to_string(),
            reasoning: vec![
                "Need customers with no invoices".to_string(),
                "invoice has customer_id as foreign key".to_string(),
                "LEFT JOIN and filter where invoice_id is NULL".to_string(),
            ],
            sql: Some(
                "SELECT c.first_name, c.last_name, c.email\n\
                 FROM customer c\n\
                 LEFT JOIN invoice i ON c.customer_id = i.customer_id\n\
                 WHERE i.invoice_id IS NULL;"
                    .to_string(),
            ),
            data: Some(ResultSet {
                columns: vec![
                    "FirstName".to_string(),
                    "LastName".to_string(),
                    "Email".to_string(),
                ],
                rows: vec![],
            }),
        })
    }

    fn answer_orders_last_year() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "Here are the total sales for the year 2013.".to_string(),
            reasoning: vec![
                "Filtering invoice_date for year 2013".to_string(),
                "Summing the total column".to_string(),
            ],
            sql: Some(
                "SELECT SUM(total) AS total_sales FROM invoice \
                 WHERE strftime('%Y', invoice_date) = '2013';"
                    .to_string(),
            ),
            data: Some(ResultSet {
                columns: vec!["TotalSales".to_string()],
                rows: vec![vec!["450.58".to_string()]],
            }),
        })
    }

    fn answer_orders_last_30_days() -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: "There are no invoices in the last 30 days; the dataset ends in 2013."
                .to_string(),
            reasoning: vec![
                "Filtering invoice_date to the last 30 days".to_string(),
                "No rows match; the sample data is historical".to_string(),
            ],
            sql: Some(
                "SELECT * FROM invoice WHERE invoice_date >= date('now', '-30 days');".to_string(),
            ),
            data: Some(ResultSet {
                columns: vec!["InvoiceId".to_string(), "InvoiceDate".to_string()],
                rows: vec![],
            }),
        })
    }

    fn interrupt_temporal(query: &str) -> EngineOutcome {
        EngineOutcome::Interruption(InterruptionPayload {
            question: "'Recent' is ambiguous. Do you mean the last 30 days, \
                       or the last year of data (2013)?"
                .to_string(),
            mcq_options: vec![
                "Last 30 days".to_string(),
                "Last year (2013)".to_string(),
            ],
            context: json!({ "step": STEP_TEMPORAL, "query": query }),
        })
    }

    fn interrupt_ranking(query: &str) -> EngineOutcome {
        EngineOutcome::Interruption(InterruptionPayload {
            question: "'Top' is ambiguous. Rank artists by what?".to_string(),
            mcq_options: vec!["By track count".to_string(), "By sales revenue".to_string()],
            context: json!({ "step": STEP_RANKING, "query": query }),
        })
    }

    fn fallback(query: &str) -> EngineOutcome {
        EngineOutcome::Answer(AnswerPayload {
            content: format!(
                "I couldn't map \"{query}\" onto the music-store schema. \
                 Try asking about customers, invoices, artists or tracks."
            ),
            reasoning: vec![],
            sql: None,
            data: None,
        })
    }

    fn resolve_new_query(&self, text: &str) -> EngineOutcome {
        let q = text.to_lowercase();

        if q.contains("brazil") && q.contains("customer") {
            return Self::answer_brazil();
        }

        // Explicit metric: no ambiguity
        if q.contains("artist") && q.contains("most tracks") {
            return Self::answer_top_artists_by_tracks();
        }

        // Ranking terms without a metric are vague
        if (q.contains("top") || q.contains("best")) && q.contains("artist") {
            return Self::interrupt_ranking(text);
        }

        if q.contains("never") && (q.contains("purchase") || q.contains("buy")) {
            return Self::answer_never_purchased();
        }

        // Temporal terms are vague
        if q.contains("recent") && q.contains("order") {
            return Self::interrupt_temporal(text);
        }

        if q.contains("2013") || q.contains("last year") {
            return Self::answer_orders_last_year();
        }

        Self::fallback(text)
    }

    fn resolve_resume(&self, context: &serde_json::Value, choice: &str) -> EngineOutcome {
        let step = context["step"].as_str().unwrap_or_default();
        let c = choice.to_lowercase();

        match step {
            STEP_TEMPORAL => {
                if c.contains("last year") || c.contains("2013") {
                    Self::answer_orders_last_year()
                } else if c.contains("30") {
                    Self::answer_orders_last_30_days()
                } else {
                    // Ambiguity resolution can itself be ambiguous
                    let query = context["query"].as_str().unwrap_or_default();
                    Self::interrupt_temporal(query)
                }
            }
            STEP_RANKING => {
                if c.contains("revenue") || c.contains("sales") {
                    Self::answer_top_artists_by_revenue()
                } else {
                    Self::answer_top_artists_by_tracks()
                }
            }
            _ => Self::fallback(choice),
        }
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    fn id(&self) -> &str {
        "scripted"
    }

    fn name(&self) -> &str {
        "Scripted (music store)"
    }

    async fn resolve(&self, request: EngineRequest) -> anyhow::Result<EngineOutcome> {
        debug!(query = request.query_text(), "scripted engine resolving");
        Ok(match &request {
            EngineRequest::NewQuery { text, .. } => self.resolve_new_query(text),
            EngineRequest::Resume {
                context, choice, ..
            } => self.resolve_resume(context, choice),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdb_core::SchemaContext;

    fn new_query(text: &str) -> EngineRequest {
        EngineRequest::NewQuery {
            text: text.to_string(),
            schema: SchemaContext::music_store(),
        }
    }

    #[tokio::test]
    async fn test_brazil_is_a_direct_answer() {
        let engine = ScriptedEngine::new();
        let outcome = engine
            .resolve(new_query("How many customers are from Brazil?"))
            .await
            .unwrap();

        match outcome {
            EngineOutcome::Answer(answer) => {
                assert_eq!(answer.data.unwrap().rows, vec![vec!["5".to_string()]]);
                assert!(answer.sql.unwrap().contains("Brazil"));
                assert!(!answer.reasoning.is_empty());
            }
            EngineOutcome::Interruption(_) => panic!("expected direct answer"),
        }
    }

    #[tokio::test]
    async fn test_recent_orders_suspends_with_two_options() {
        let engine = ScriptedEngine::new();
        let outcome = engine
            .resolve(new_query("Show me recent orders"))
            .await
            .unwrap();

        match outcome {
            EngineOutcome::Interruption(interruption) => {
                assert_eq!(interruption.mcq_options.len(), 2);
                assert_eq!(interruption.context["step"], STEP_TEMPORAL);
            }
            EngineOutcome::Answer(_) => panic!("expected interruption"),
        }
    }

    #[tokio::test]
    async fn test_resume_with_last_year_yields_year_filter() {
        let engine = ScriptedEngine::new();
        let outcome = engine
            .resolve(EngineRequest::Resume {
                original_query: "Show me recent orders".to_string(),
                context: json!({ "step": STEP_TEMPORAL, "query": "Show me recent orders" }),
                choice: "Last year (2013)".to_string(),
                schema: SchemaContext::music_store(),
            })
            .await
            .unwrap();

        match outcome {
            EngineOutcome::Answer(answer) => {
                assert!(answer.sql.unwrap().contains("2013"));
                assert_eq!(answer.data.unwrap().rows, vec![vec!["450.58".to_string()]]);
            }
            EngineOutcome::Interruption(_) => panic!("expected answer"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_choice_suspends_again() {
        let engine = ScriptedEngine::new();
        let outcome = engine
            .resolve(EngineRequest::Resume {
                original_query: "Show me recent orders".to_string(),
                context: json!({ "step": STEP_TEMPORAL, "query": "Show me recent orders" }),
                choice: "whenever".to_string(),
                schema: SchemaContext::music_store(),
            })
            .await
            .unwrap();

        assert!(matches!(outcome, EngineOutcome::Interruption(_)));
    }

    #[tokio::test]
    async fn test_top_artists_is_vague_without_metric() {
        let engine = ScriptedEngine::new();
        let outcome = engine
            .resolve(new_query("Show me top artists"))
            .await
            .unwrap();
        assert!(matches!(outcome, EngineOutcome::Interruption(_)));

        // Naming the metric skips the question
        let outcome = engine
            .resolve(new_query("Which artists have the most tracks?"))
            .await
            .unwrap();
        assert!(matches!(outcome, EngineOutcome::Answer(_)));
    }
}
