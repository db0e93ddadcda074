//! Schema context handed to the reasoning engine.
//!
//! The engine sees a compact textual summary rather than the raw catalog:
//! wide tables are capped to a handful of columns so the prompt stays small.

use serde::{Deserialize, Serialize};

/// A column with its declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: String,
}

/// A table and its columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

/// A foreign-key edge between two tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

/// Database shape given to the reasoning engine alongside each query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaContext {
    #[serde(default)]
    pub tables: Vec<TableDef>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
}

impl SchemaContext {
    /// Columns shown per table in the compact summary.
    pub const MAX_SUMMARY_COLUMNS: usize = 6;

    /// Render a compact one-table-per-line summary, capping columns.
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.tables.len() + self.foreign_keys.len());
        for table in &self.tables {
            let cols: Vec<String> = table
                .columns
                .iter()
                .take(Self::MAX_SUMMARY_COLUMNS)
                .map(|c| format!("{} {}", c.name, c.data_type))
                .collect();
            let suffix = if table.columns.len() > Self::MAX_SUMMARY_COLUMNS {
                ", ..."
            } else {
                ""
            };
            lines.push(format!("{}({}{})", table.name, cols.join(", "), suffix));
        }
        for fk in &self.foreign_keys {
            lines.push(format!(
                "{}.{} -> {}.{}",
                fk.from_table, fk.from_column, fk.to_table, fk.to_column
            ));
        }
        lines.join("\n")
    }

    /// The bundled music-store sample schema used by the scripted engine
    /// and the test suite.
    pub fn music_store() -> Self {
        fn table(name: &str, cols: &[(&str, &str)]) -> TableDef {
            TableDef {
                name: name.to_string(),
                columns: cols
                    .iter()
                    .map(|(n, t)| ColumnDef {
                        name: n.to_string(),
                        data_type: t.to_string(),
                    })
                    .collect(),
            }
        }
        fn fk(from: (&str, &str), to: (&str, &str)) -> ForeignKey {
            ForeignKey {
                from_table: from.0.to_string(),
                from_column: from.1.to_string(),
                to_table: to.0.to_string(),
                to_column: to.1.to_string(),
            }
        }

        Self {
            tables: vec![
                table("artist", &[("artist_id", "integer"), ("name", "text")]),
                table(
                    "album",
                    &[
                        ("album_id", "integer"),
                        ("title", "text"),
                        ("artist_id", "integer"),
                    ],
                ),
                table(
                    "track",
                    &[
                        ("track_id", "integer"),
                        ("name", "text"),
                        ("album_id", "integer"),
                        ("genre_id", "integer"),
                        ("composer", "text"),
                        ("milliseconds", "integer"),
                        ("unit_price", "numeric"),
                    ],
                ),
                table(
                    "customer",
                    &[
                        ("customer_id", "integer"),
                        ("first_name", "text"),
                        ("last_name", "text"),
                        ("country", "text"),
                        ("email", "text"),
                        ("support_rep_id", "integer"),
                    ],
                ),
                table(
                    "invoice",
                    &[
                        ("invoice_id", "integer"),
                        ("customer_id", "integer"),
                        ("invoice_date", "timestamp"),
                        ("billing_country", "text"),
                        ("total", "numeric"),
                    ],
                ),
                table(
                    "invoice_line",
                    &[
                        ("invoice_line_id", "integer"),
                        ("invoice_id", "integer"),
                        ("track_id", "integer"),
                        ("unit_price", "numeric"),
                        ("quantity", "integer"),
                    ],
                ),
            ],
            foreign_keys: vec![
                fk(("album", "artist_id"), ("artist", "artist_id")),
                fk(("track", "album_id"), ("album", "album_id")),
                fk(("invoice", "customer_id"), ("customer", "customer_id")),
                fk(("invoice_line", "invoice_id"), ("invoice", "invoice_id")),
                fk(("invoice_line", "track_id"), ("track", "track_id")),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_caps_columns() {
        let schema = SchemaContext::music_store();
        let summary = schema.summary();

        // track has 7 columns, so it gets truncated
        let track_line = summary
            .lines()
            .find(|l| l.starts_with("track("))
            .expect("track table in summary");
        assert!(track_line.ends_with(", ...)"));
        assert_eq!(track_line.matches(',').count(), SchemaContext::MAX_SUMMARY_COLUMNS);

        // narrow tables are not truncated
        let artist_line = summary.lines().find(|l| l.starts_with("artist(")).unwrap();
        assert!(!artist_line.contains("..."));
    }

    #[test]
    fn test_summary_includes_fk_edges() {
        let summary = SchemaContext::music_store().summary();
        assert!(summary.contains("invoice.customer_id -> customer.customer_id"));
    }
}
