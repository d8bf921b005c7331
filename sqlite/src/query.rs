//! Ad-hoc SQL execution.
//!
//! [`run_query`] never fails: engine errors are captured in
//! [`QueryOutcome::error`] so the caller can show them next to the
//! statement that produced them. Result rows are capped; statements that
//! return no columns report the number of changed rows instead.

use litebrowse_core::Row;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::convert;
use crate::error::Result;

/// Result of one ad-hoc statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryOutcome {
    /// The statement as submitted.
    pub sql: String,
    /// The statement as executed, after any ordering wrapper.
    pub executed_sql: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// Rows returned, or rows changed for statements without results.
    pub row_count: usize,
    /// Whether more rows were available than the cap allowed.
    pub truncated: bool,
    /// Whether the statement may have written to the database, schema
    /// included.
    pub writes: bool,
    pub error: Option<String>,
}

/// Wraps `sql` so its result is ordered by the 1-based column `ordering`;
/// negative values sort descending and zero leaves the statement as is.
///
/// # Examples
///
/// ```
/// use litebrowse_sqlite::ordered_sql;
///
/// assert_eq!(
///     ordered_sql("SELECT a, b FROM t; ", Some(-2)),
///     "SELECT * FROM (SELECT a, b FROM t) AS _ ORDER BY 2 DESC"
/// );
/// assert_eq!(ordered_sql("SELECT 1", None), "SELECT 1");
/// ```
pub fn ordered_sql(sql: &str, ordering: Option<i64>) -> String {
    match ordering {
        Some(n) if n != 0 => {
            let inner = sql.trim_end_matches(|c: char| c.is_whitespace() || c == ';');
            let direction = if n < 0 { "DESC" } else { "ASC" };
            format!(
                "SELECT * FROM ({inner}) AS _ ORDER BY {} {direction}",
                n.unsigned_abs()
            )
        }
        _ => sql.to_string(),
    }
}

/// Executes one statement, returning at most `max_rows` rows.
pub fn run_query(
    conn: &Connection,
    sql: &str,
    ordering: Option<i64>,
    max_rows: usize,
) -> QueryOutcome {
    let executed_sql = ordered_sql(sql, ordering);
    let mut outcome = QueryOutcome {
        sql: sql.to_string(),
        executed_sql,
        ..QueryOutcome::default()
    };
    if let Err(err) = execute(conn, max_rows, &mut outcome) {
        warn!(sql = %outcome.executed_sql, error = %err, "query failed");
        outcome.error = Some(err.to_string());
    }
    outcome
}

fn execute(conn: &Connection, max_rows: usize, outcome: &mut QueryOutcome) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(&outcome.executed_sql)?;
    outcome.writes = !stmt.readonly();
    if stmt.column_count() == 0 {
        outcome.row_count = stmt.execute([])?;
        debug!(changed = outcome.row_count, "executed statement");
        return Ok(());
    }

    outcome.columns = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        if outcome.rows.len() == max_rows {
            outcome.truncated = true;
            break;
        }
        outcome.rows.push(convert::read_row(row, &outcome.columns, None)?);
    }
    outcome.row_count = outcome.rows.len();
    debug!(
        rows = outcome.row_count,
        truncated = outcome.truncated,
        "executed query"
    );
    Ok(())
}

/// Executes a query and returns every row, uncapped, with its column names.
///
/// # Errors
///
/// Returns [`AdminError::Execution`](crate::AdminError::Execution) if the
/// statement fails.
pub fn query_rows(conn: &Connection, sql: &str) -> Result<(Vec<String>, Vec<Row>)> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let rows = stmt
        .query_map([], |row| convert::read_row(row, &columns, None))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use litebrowse_core::Value;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (a INTEGER, b TEXT);
             INSERT INTO t VALUES (1, 'one'), (2, 'two'), (3, 'three');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_ordered_wrapper_ascending() {
        assert_eq!(
            ordered_sql("SELECT * FROM t;;", Some(1)),
            "SELECT * FROM (SELECT * FROM t) AS _ ORDER BY 1 ASC"
        );
        assert_eq!(ordered_sql("SELECT 1", Some(0)), "SELECT 1");
    }

    #[test]
    fn test_run_query_ordered_and_capped() {
        let conn = setup();
        let outcome = run_query(&conn, "SELECT a, b FROM t", Some(-1), 2);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.columns, ["a", "b"]);
        assert_eq!(outcome.row_count, 2);
        assert!(outcome.truncated);
        assert_eq!(outcome.rows[0].get("a"), Some(&Value::Integer(3)));
        assert!(!outcome.writes);

        let exact = run_query(&conn, "SELECT a FROM t", None, 3);
        assert!(!exact.truncated);
        assert_eq!(exact.row_count, 3);
    }

    #[test]
    fn test_run_query_captures_errors() {
        let conn = setup();
        let outcome = run_query(&conn, "SELECT nope FROM t", None, 10);
        assert!(outcome.error.unwrap().contains("nope"));
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn test_run_statement_reports_changes() {
        let conn = setup();
        let outcome = run_query(&conn, "UPDATE t SET b = 'x' WHERE a > 1", None, 10);
        assert!(outcome.error.is_none());
        assert!(outcome.columns.is_empty());
        assert_eq!(outcome.row_count, 2);
        assert!(outcome.writes);

        let ddl = run_query(&conn, "ALTER TABLE t ADD COLUMN c TEXT", None, 10);
        assert!(ddl.error.is_none());
        assert!(ddl.writes);
    }

    #[test]
    fn test_query_rows_uncapped() {
        let conn = setup();
        let (columns, rows) = query_rows(&conn, "SELECT b FROM t ORDER BY a").unwrap();
        assert_eq!(columns, ["b"]);
        assert_eq!(rows.len(), 3);
        assert!(query_rows(&conn, "SELECT * FROM missing").is_err());
    }
}
