//! Table data import and export as JSON or CSV.
//!
//! Exports produce a complete in-memory body plus a suggested filename.
//! Imports read either format into generic rows and insert them in a single
//! transaction; in non-strict mode columns present in the data but missing
//! from the table are added first.

use std::io::Read;

use litebrowse_core::{DeclaredType, Row, TableMetadata, Value, quote_ident};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;
use tracing::info;

use crate::cache::MetadataCache;
use crate::convert;
use crate::database::write_transaction;
use crate::error::{AdminError, EntityKind, Result};
use crate::query::query_rows;

/// Output format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

/// Input format of an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Json,
    Csv,
}

/// A finished export, ready to be written or sent.
#[derive(Debug, Clone, Serialize)]
pub struct Export {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

/// Suggested download name: `export.<ext>`, or `<table>-export.<ext>`,
/// keeping only ASCII letters, digits, `_`, `.` and `-`.
///
/// # Examples
///
/// ```
/// use litebrowse_sqlite::{ExportFormat, export_filename};
///
/// assert_eq!(export_filename(None, ExportFormat::Csv), "export.csv");
/// assert_eq!(export_filename(Some("my table!"), ExportFormat::Json), "mytable-export.json");
/// ```
pub fn export_filename(table: Option<&str>, format: ExportFormat) -> String {
    let raw = match table {
        Some(table) => format!("{table}-export.{}", format.extension()),
        None => format!("export.{}", format.extension()),
    };
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect()
}

/// Import and export for one session.
pub struct Transfer<'a> {
    conn: &'a Connection,
    cache: &'a MetadataCache,
}

impl<'a> Transfer<'a> {
    pub fn new(conn: &'a Connection, cache: &'a MetadataCache) -> Self {
        Self { conn, cache }
    }

    /// Exports the chosen columns of every row of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingInput`](AdminError::MissingInput) if no column is
    /// selected and [`NotFound`](AdminError::NotFound) for unknown tables or
    /// columns.
    pub fn export(&self, table: &str, columns: &[String], format: ExportFormat) -> Result<Export> {
        if columns.is_empty() {
            return Err(AdminError::MissingInput("export columns".to_string()));
        }
        let meta = self.cache.get(self.conn, table)?;
        let mut selected = Vec::with_capacity(columns.len());
        for name in columns {
            let column = meta
                .column(name)
                .ok_or_else(|| AdminError::not_found(EntityKind::Column, name.as_str()))?;
            selected.push(quote_ident(&column.name));
        }
        let sql = format!("SELECT {} FROM {}", selected.join(", "), quote_ident(table));
        self.export_query(&sql, format, Some(table))
    }

    /// Exports the full result of `sql`.
    pub fn export_query(
        &self,
        sql: &str,
        format: ExportFormat,
        table: Option<&str>,
    ) -> Result<Export> {
        let (columns, rows) = query_rows(self.conn, sql)?;
        let body = match format {
            ExportFormat::Json => serde_json::to_string_pretty(&rows)?,
            ExportFormat::Csv => to_csv(&columns, &rows)?,
        };
        info!(rows = rows.len(), ?format, "exported rows");
        Ok(Export {
            filename: export_filename(table, format),
            content_type: format.content_type(),
            body,
        })
    }

    /// Imports rows into `table` and returns how many were inserted.
    ///
    /// JSON input is an array of objects; CSV input has a header row. With
    /// `strict`, keys that are not columns of the table are ignored;
    /// otherwise such columns are added, typed from the first non-null value.
    /// Rows with no usable key are skipped. Everything runs in one
    /// transaction.
    pub fn import(
        &self,
        table: &str,
        format: ImportFormat,
        reader: impl Read,
        strict: bool,
    ) -> Result<usize> {
        let meta = self.cache.get(self.conn, table)?;
        let records = match format {
            ImportFormat::Json => read_json(reader)?,
            ImportFormat::Csv => read_csv(reader)?,
        };

        let mut known: Vec<String> = meta.columns.iter().map(|c| c.name.clone()).collect();
        let tx = write_transaction(self.conn)?;
        if !strict {
            for (name, declared) in new_columns(&meta, &records) {
                let sql = format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    quote_ident(table),
                    quote_ident(&name),
                    declared.as_sql()
                );
                tx.execute_batch(&sql)?;
                info!(table, column = %name, "added column during import");
                known.push(name);
            }
        }

        let mut inserted = 0;
        for record in &records {
            let fields: Vec<(&str, &Value)> = record
                .iter()
                .filter(|(name, _)| known.iter().any(|k| k.eq_ignore_ascii_case(name)))
                .collect();
            if fields.is_empty() {
                continue;
            }
            let columns: Vec<String> = fields.iter().map(|(name, _)| quote_ident(name)).collect();
            let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(table),
                columns.join(", "),
                placeholders.join(", ")
            );
            let params: Vec<SqlValue> = fields.iter().map(|(_, v)| convert::to_sql(v)).collect();
            inserted += tx.execute(&sql, params_from_iter(params.iter()))?;
        }
        tx.commit()?;
        info!(table, rows = inserted, strict, "imported rows");
        self.cache.reload(self.conn, table);
        Ok(inserted)
    }
}

fn to_csv(columns: &[String], rows: &[Row]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(row.iter().map(|(_, value)| value.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| AdminError::Io(err.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_json(reader: impl Read) -> Result<Vec<Row>> {
    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_reader(reader)?;
    Ok(objects
        .into_iter()
        .map(|object| {
            object
                .into_iter()
                .map(|(key, value)| (key, json_value(value)))
                .collect()
        })
        .collect())
}

fn json_value(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Null, Value::Real),
        },
        serde_json::Value::String(s) => Value::Text(s),
        other => Value::Text(other.to_string()),
    }
}

fn read_csv(reader: impl Read) -> Result<Vec<Row>> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(name, value)| (name.to_string(), Value::Text(value.to_string())))
                .collect(),
        );
    }
    Ok(rows)
}

/// Keys absent from `meta`, in first-seen order, with a guessed type.
fn new_columns(meta: &TableMetadata, records: &[Row]) -> Vec<(String, DeclaredType)> {
    let mut found: Vec<String> = Vec::new();
    for record in records {
        for name in record.columns() {
            let known = meta.columns.iter().any(|c| c.name.eq_ignore_ascii_case(name))
                || found.iter().any(|f| f.eq_ignore_ascii_case(name));
            if !known {
                found.push(name.to_string());
            }
        }
    }
    found
        .into_iter()
        .map(|name| {
            let sample = records
                .iter()
                .filter_map(|r| r.get(&name))
                .find(|v| !v.is_null());
            let declared = guess_type(sample);
            (name, declared)
        })
        .collect()
}

fn guess_type(sample: Option<&Value>) -> DeclaredType {
    match sample {
        Some(Value::Integer(_)) => DeclaredType::Integer,
        Some(Value::Real(_)) => DeclaredType::Real,
        Some(Value::Bool(_)) => DeclaredType::Bool,
        Some(Value::Blob(_)) => DeclaredType::Blob,
        Some(Value::Text(text)) if text.parse::<i64>().is_ok() => DeclaredType::Integer,
        Some(Value::Text(text)) if text.parse::<f64>().is_ok() => DeclaredType::Real,
        _ => DeclaredType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Connection, MetadataCache) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, note TEXT);
            INSERT INTO people (name, note) VALUES ('Ada', 'says "hi"'), ('Bob', NULL);
            "#,
        )
        .unwrap();
        (conn, MetadataCache::new())
    }

    #[test]
    fn test_export_json() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let export = transfer
            .export("people", &["id".to_string(), "name".to_string()], ExportFormat::Json)
            .unwrap();
        assert_eq!(export.filename, "people-export.json");
        assert_eq!(export.content_type, "application/json");
        let parsed: serde_json::Value = serde_json::from_str(&export.body).unwrap();
        assert_eq!(parsed[0]["name"], "Ada");
        assert_eq!(parsed[1]["id"], 2);
        assert!(export.body.contains("\n  {"));
    }

    #[test]
    fn test_export_csv() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let export = transfer
            .export("people", &["name".to_string(), "note".to_string()], ExportFormat::Csv)
            .unwrap();
        assert_eq!(export.body, "name,note\nAda,\"says \"\"hi\"\"\"\nBob,\n");
    }

    #[test]
    fn test_export_rejections() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        assert!(matches!(
            transfer.export("people", &[], ExportFormat::Csv),
            Err(AdminError::MissingInput(_))
        ));
        assert!(matches!(
            transfer.export("people", &["age".to_string()], ExportFormat::Csv),
            Err(AdminError::NotFound { .. })
        ));
    }

    #[test]
    fn test_export_query_filename() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let export = transfer
            .export_query("SELECT name FROM people", ExportFormat::Csv, None)
            .unwrap();
        assert_eq!(export.filename, "export.csv");
        assert_eq!(export.body.lines().count(), 3);
    }

    #[test]
    fn test_import_strict_ignores_unknown_keys() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let json = r#"[{"name": "Cy", "age": 30}, {"age": 5}]"#;
        let inserted = transfer
            .import("people", ImportFormat::Json, json.as_bytes(), true)
            .unwrap();
        assert_eq!(inserted, 1);
        assert!(!cache.get(&conn, "people").unwrap().has_column("age"));
    }

    #[test]
    fn test_import_adds_missing_columns() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let csv = "name,age,score\nCy,30,1.5\nDi,41,2\n";
        let inserted = transfer
            .import("people", ImportFormat::Csv, csv.as_bytes(), false)
            .unwrap();
        assert_eq!(inserted, 2);

        let meta = cache.get(&conn, "people").unwrap();
        assert_eq!(meta.column("age").unwrap().declared_type, DeclaredType::Integer);
        assert_eq!(meta.column("score").unwrap().declared_type, DeclaredType::Real);
        let age: i64 = conn
            .query_row("SELECT age FROM people WHERE name = 'Di'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(age, 41);
    }

    #[test]
    fn test_import_is_atomic() {
        let (conn, cache) = setup();
        let transfer = Transfer::new(&conn, &cache);
        let json = r#"[{"id": 10, "name": "Cy"}, {"id": 10, "name": "Dup"}]"#;
        assert!(transfer
            .import("people", ImportFormat::Json, json.as_bytes(), true)
            .is_err());
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM people", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_guess_type() {
        assert_eq!(guess_type(Some(&Value::Bool(true))), DeclaredType::Bool);
        assert_eq!(guess_type(Some(&Value::Text("7".into()))), DeclaredType::Integer);
        assert_eq!(guess_type(Some(&Value::Text("seven".into()))), DeclaredType::Text);
        assert_eq!(guess_type(None), DeclaredType::Text);
    }
}
