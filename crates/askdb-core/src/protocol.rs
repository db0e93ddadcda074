//! Wire protocol shapes for the query gateway.
//!
//! One endpoint carries every turn of a conversation. The request is
//! explicitly tagged by which field is present: `human_choice` marks an
//! answer to a pending interruption, otherwise `query` is a new question.

use serde::{Deserialize, Serialize};

/// Inbound turn, client to gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    /// Natural-language question. Ignored by the protocol when
    /// `human_choice` is present, but always carried so an expired
    /// session can fall back to a fresh query.
    pub query: String,
    /// Conversation id; omitted on the first turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Present only when answering an interruption
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_choice: Option<HumanChoice>,
}

impl TurnRequest {
    /// Start a new conversation turn.
    pub fn query(text: impl Into<String>) -> Self {
        Self {
            query: text.into(),
            thread_id: None,
            human_choice: None,
        }
    }

    /// Whether this turn answers a pending interruption.
    pub fn is_answer(&self) -> bool {
        self.human_choice.is_some()
    }
}

/// A human answer to an interruption: a 1-based option index or free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HumanChoice {
    /// 1-based index into the offered options
    Index(i64),
    /// Free-form answer text
    Text(String),
}

impl HumanChoice {
    /// Resolve against the offered options.
    ///
    /// A valid 1-based index maps to the option text. Anything else,
    /// including an out-of-range index, passes through as free text;
    /// the reasoning engine is the final arbiter of validity.
    pub fn resolve(&self, mcq_options: &[String]) -> String {
        match self {
            HumanChoice::Index(n) => {
                let idx = *n - 1;
                if idx >= 0 && (idx as usize) < mcq_options.len() {
                    mcq_options[idx as usize].clone()
                } else {
                    n.to_string()
                }
            }
            HumanChoice::Text(s) => {
                // Numeric strings count as indices too; clients that render
                // numbered options often send the number back as text.
                if let Ok(n) = s.trim().parse::<i64>() {
                    return HumanChoice::Index(n).resolve(mcq_options);
                }
                s.clone()
            }
        }
    }
}

/// Whether a response is a final answer or a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnKind {
    /// Final answer for this turn
    Answer,
    /// Reasoning is suspended pending human disambiguation
    Interruption,
}

/// Tabular query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Column names
    pub columns: Vec<String>,
    /// Row values, stringified
    pub rows: Vec<Vec<String>>,
}

/// Outbound turn, gateway to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Always "system"
    pub role: String,
    /// Human-readable answer or clarifying question
    pub content: String,
    /// Conversation id to echo on the next turn
    pub thread_id: String,
    /// Answer or interruption
    #[serde(rename = "type")]
    pub kind: TurnKind,
    /// Reasoning trace, present on answers when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Vec<String>>,
    /// Generated SQL, when the turn produced any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    /// Result rows, when the turn produced any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResultSet>,
    /// Enumerated choices, present on interruptions with options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mcq_options: Option<Vec<String>>,
}

impl TurnResponse {
    /// Build a final-answer response.
    pub fn answer(thread_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
            thread_id: thread_id.into(),
            kind: TurnKind::Answer,
            reasoning: None,
            sql: None,
            data: None,
            mcq_options: None,
        }
    }

    /// Build an interruption response.
    pub fn interruption(
        thread_id: impl Into<String>,
        question: impl Into<String>,
        mcq_options: Vec<String>,
    ) -> Self {
        Self {
            role: "system".to_string(),
            content: question.into(),
            thread_id: thread_id.into(),
            kind: TurnKind::Interruption,
            reasoning: None,
            sql: None,
            data: None,
            mcq_options: if mcq_options.is_empty() {
                None
            } else {
                Some(mcq_options)
            },
        }
    }

    /// Attach a reasoning trace.
    pub fn with_reasoning(mut self, reasoning: Vec<String>) -> Self {
        if !reasoning.is_empty() {
            self.reasoning = Some(reasoning);
        }
        self
    }

    /// Attach generated SQL.
    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Attach result rows.
    pub fn with_data(mut self, data: ResultSet) -> Self {
        self.data = Some(data);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_choice_accepts_int_or_string() {
        let from_int: HumanChoice = serde_json::from_str("2").unwrap();
        assert_eq!(from_int, HumanChoice::Index(2));

        let from_str: HumanChoice = serde_json::from_str("\"last year\"").unwrap();
        assert_eq!(from_str, HumanChoice::Text("last year".into()));
    }

    #[test]
    fn test_resolve_index_to_option_text() {
        let options = vec!["A".to_string(), "B".to_string()];
        assert_eq!(HumanChoice::Index(1).resolve(&options), "A");
        assert_eq!(HumanChoice::Index(2).resolve(&options), "B");
        // Numeric text behaves like an index
        assert_eq!(HumanChoice::Text("1".into()).resolve(&options), "A");
    }

    #[test]
    fn test_out_of_range_index_passes_through() {
        let options = vec!["A".to_string(), "B".to_string()];
        assert_eq!(HumanChoice::Index(7).resolve(&options), "7");
        assert_eq!(HumanChoice::Index(0).resolve(&options), "0");
    }

    #[test]
    fn test_free_text_when_no_options() {
        assert_eq!(
            HumanChoice::Text("the 2013 data".into()).resolve(&[]),
            "the 2013 data"
        );
    }

    #[test]
    fn test_request_tagging() {
        let req: TurnRequest =
            serde_json::from_str(r#"{"query": "Show me recent orders"}"#).unwrap();
        assert!(!req.is_answer());
        assert!(req.thread_id.is_none());

        let req: TurnRequest = serde_json::from_str(
            r#"{"query": "Show me recent orders", "thread_id": "t1", "human_choice": 2}"#,
        )
        .unwrap();
        assert!(req.is_answer());
    }

    #[test]
    fn test_response_serialization_shape() {
        let resp = TurnResponse::answer("t1", "There are 5 customers from Brazil.")
            .with_sql("SELECT count(*) FROM customer WHERE country = 'Brazil';")
            .with_data(ResultSet {
                columns: vec!["Count".into()],
                rows: vec![vec!["5".into()]],
            });

        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["role"], "system");
        assert_eq!(value["type"], "answer");
        assert_eq!(value["data"]["rows"][0][0], "5");
        // Absent optionals are omitted, not null
        assert!(value.get("mcq_options").is_none());
    }

    #[test]
    fn test_interruption_omits_empty_options() {
        let resp = TurnResponse::interruption("t1", "Which timeframe?", vec![]);
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["type"], "interruption");
        assert!(value.get("mcq_options").is_none());
    }
}
