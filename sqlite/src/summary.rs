//! Human-readable labels for foreign-key values.
//!
//! When a referenced table is small, each of its rows gets a short label so
//! a listing can show `3 (Ada Lovelace)` instead of a bare `3`.

use std::collections::BTreeMap;

use litebrowse_core::{Column, ForeignKey, Row, TableMetadata, TypeFamily, Value, quote_ident};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::query::query_rows;
use crate::rows::RowAccess;

/// Longest label kept, in characters.
pub const MAX_LABEL_LENGTH: usize = 32;

/// Labels for the rows one foreign key can point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeySummary {
    pub column: String,
    pub dest_table: String,
    pub dest_column: String,
    /// Referenced key text to label.
    pub labels: BTreeMap<String, String>,
}

impl ForeignKeySummary {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

impl RowAccess<'_> {
    /// Summarizes every foreign key of `table` whose referenced table has
    /// fewer than [`fk_summary_threshold`](crate::AdminConfig::fk_summary_threshold)
    /// rows, keyed by the referencing column.
    pub fn summarize_foreign_keys(&self, table: &str) -> Result<BTreeMap<String, ForeignKeySummary>> {
        let meta = self.cache.get(self.conn, table)?;
        let mut summaries = BTreeMap::new();
        for fk in &meta.foreign_keys {
            if let Some(summary) = self.summarize(fk)? {
                summaries.insert(fk.column.clone(), summary);
            }
        }
        Ok(summaries)
    }

    fn summarize(&self, fk: &ForeignKey) -> Result<Option<ForeignKeySummary>> {
        let dest_sql = quote_ident(&fk.dest_table);
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {dest_sql}"), [], |row| row.get(0))?;
        if u64::try_from(count).unwrap_or(u64::MAX) >= self.config.fk_summary_threshold {
            debug!(table = %fk.dest_table, count, "referenced table too large to summarize");
            return Ok(None);
        }

        let dest = self.cache.get(self.conn, &fk.dest_table)?;
        let tiers = label_tiers(&dest, &fk.dest_column);
        let (_, rows) = query_rows(self.conn, &format!("SELECT * FROM {dest_sql}"))?;

        let labels = rows
            .iter()
            .filter_map(|row| {
                let key = row.get(&fk.dest_column)?.key_text()?;
                let label = row_label(row, &tiers)?;
                Some((key, label))
            })
            .collect();

        Ok(Some(ForeignKeySummary {
            column: fk.column.clone(),
            dest_table: fk.dest_table.clone(),
            dest_column: fk.dest_column.clone(),
            labels,
        }))
    }
}

/// Candidate label columns in order of preference: `name`/`title`, then
/// text columns, then anything that is not itself a foreign key. The
/// referenced column is never a candidate.
fn label_tiers<'m>(dest: &'m TableMetadata, key_column: &str) -> [Vec<&'m str>; 3] {
    let tier = |pred: fn(&TableMetadata, &Column) -> bool| -> Vec<&'m str> {
        dest.columns
            .iter()
            .filter(|c| c.name != key_column && pred(dest, *c))
            .map(|c| c.name.as_str())
            .collect()
    };
    [
        tier(|_, c| c.name.eq_ignore_ascii_case("name") || c.name.eq_ignore_ascii_case("title")),
        tier(|_, c| c.family() == TypeFamily::Text),
        tier(|meta, c| meta.foreign_key(&c.name).is_none()),
    ]
}

/// Shortest non-empty value among the first tier that has one.
fn row_label(row: &Row, tiers: &[Vec<&str>]) -> Option<String> {
    tiers.iter().find_map(|tier| {
        tier.iter()
            .filter_map(|column| match row.get(column)? {
                Value::Null | Value::Blob(_) => None,
                value => {
                    let text = value.to_string();
                    let text = text.trim();
                    (!text.is_empty()).then(|| text.to_string())
                }
            })
            .min_by_key(|text| text.chars().count())
            .map(|text| text.chars().take(MAX_LABEL_LENGTH).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MetadataCache;
    use crate::config::AdminConfig;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT, bio TEXT);
            INSERT INTO authors VALUES
                (1, 'Ada', 'Mathematician'),
                (2, NULL, 'x'),
                (3, '   ', NULL);
            CREATE TABLE codes (code INTEGER PRIMARY KEY, num INTEGER);
            INSERT INTO codes VALUES (7, 700);
            CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                author_id INTEGER REFERENCES authors (id),
                code INTEGER REFERENCES codes (code)
            );
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_labels_prefer_name_then_text() {
        let conn = setup();
        let cache = MetadataCache::new();
        let config = AdminConfig::default();
        let rows = RowAccess::new(&conn, &cache, &config);
        let summaries = rows.summarize_foreign_keys("books").unwrap();

        let authors = &summaries["author_id"];
        assert_eq!(authors.label("1"), Some("Ada"));
        // No usable name; falls through to the shortest text value.
        assert_eq!(authors.label("2"), Some("x"));
        assert_eq!(authors.label("3"), None);

        let codes = &summaries["code"];
        assert_eq!(codes.label("7"), Some("700"));
    }

    #[test]
    fn test_large_tables_not_summarized() {
        let conn = setup();
        let cache = MetadataCache::new();
        let config = AdminConfig {
            fk_summary_threshold: 1,
            ..AdminConfig::default()
        };
        let rows = RowAccess::new(&conn, &cache, &config);
        let summaries = rows.summarize_foreign_keys("books").unwrap();
        assert!(!summaries.contains_key("author_id"));
        assert!(!summaries.contains_key("code"));
    }

    #[test]
    fn test_label_truncated() {
        let row: Row = [("name".to_string(), Value::Text("y".repeat(40)))]
            .into_iter()
            .collect();
        let label = row_label(&row, &[vec!["name"]]).unwrap();
        assert_eq!(label.chars().count(), MAX_LABEL_LENGTH);
    }
}
