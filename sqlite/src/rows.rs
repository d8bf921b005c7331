//! Browsing and editing table rows.
//!
//! Rows are generic [`Row`] maps typed by the table's cached
//! [`TableMetadata`]; nothing here is generated per table. Rows are
//! addressed by [`PkToken`]s produced by the primary-key codec, and every
//! submitted value goes through the value codec before any SQL runs.
//!
//! # Example
//!
//! ```no_run
//! use litebrowse_core::PageRequest;
//! use litebrowse_sqlite::{AdminConfig, Database, OpenMode, Ordering, TableQuery};
//!
//! let db = Database::open("app.db", OpenMode::ReadWrite, AdminConfig::default()).unwrap();
//! let session = db.session().unwrap();
//! let rows = session.rows();
//!
//! let query = TableQuery {
//!     filter: vec![("status".to_string(), "active".to_string())],
//!     ordering: Ordering::parse("-created"),
//!     page: PageRequest::parse("2"),
//! };
//! let page = rows.browse("users", &query).unwrap();
//! println!("page {} of {}", page.pagination.page, page.pagination.total_pages);
//!
//! rows.insert("users", &[("name".to_string(), "Ada".to_string())]).unwrap();
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use litebrowse_core::{
    KeyPredicate, PageRequest, Pagination, PkToken, Row, TableMetadata, Value, decode_fields,
    pk, quote_ident, render_for_input,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::MetadataCache;
use crate::config::AdminConfig;
use crate::convert;
use crate::database::write_transaction;
use crate::error::{AdminError, EntityKind, Result};

/// Sort direction of an [`Ordering`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Column ordering for a browse request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ordering {
    pub column: String,
    pub direction: Direction,
}

impl Ordering {
    /// Parses `col` (ascending) or `-col` (descending).
    ///
    /// Returns `None` for an empty column name.
    ///
    /// # Examples
    ///
    /// ```
    /// use litebrowse_sqlite::{Direction, Ordering};
    ///
    /// let ordering = Ordering::parse("-price").unwrap();
    /// assert_eq!(ordering.column, "price");
    /// assert_eq!(ordering.direction, Direction::Desc);
    /// assert!(Ordering::parse("").is_none());
    /// ```
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (column, direction) = match raw.strip_prefix('-') {
            Some(rest) => (rest, Direction::Desc),
            None => (raw, Direction::Asc),
        };
        if column.is_empty() {
            return None;
        }
        Some(Self {
            column: column.to_string(),
            direction,
        })
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Asc => f.write_str(&self.column),
            Direction::Desc => write!(f, "-{}", self.column),
        }
    }
}

/// Filter, ordering and page of a browse request.
#[derive(Debug, Clone, Default)]
pub struct TableQuery {
    /// Raw `(column, value)` equality filters; unknown columns are ignored.
    pub filter: Vec<(String, String)>,
    pub ordering: Option<Ordering>,
    pub page: PageRequest,
}

/// One row of a browse result together with its key token.
#[derive(Debug, Clone, Serialize)]
pub struct PageRow {
    /// `None` when the table has no primary key.
    pub key: Option<PkToken>,
    pub values: Row,
}

/// One page of a table.
#[derive(Debug, Clone, Serialize)]
pub struct RowPage {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<PageRow>,
    pub pagination: Pagination,
    pub ordering: Option<Ordering>,
    /// Sums of the numeric columns over the filtered rows; `None` when the
    /// filtered set is too large to sum.
    pub sums: Option<BTreeMap<String, Value>>,
}

/// Row reads and writes for one session.
pub struct RowAccess<'a> {
    pub(crate) conn: &'a Connection,
    pub(crate) cache: &'a MetadataCache,
    pub(crate) config: &'a AdminConfig,
}

impl<'a> RowAccess<'a> {
    pub fn new(conn: &'a Connection, cache: &'a MetadataCache, config: &'a AdminConfig) -> Self {
        Self {
            conn,
            cache,
            config,
        }
    }

    /// Returns one page of `table`, filtered and ordered as requested.
    ///
    /// A filter value of `null` matches `IS NULL`. Pagination is computed
    /// over the filtered row count.
    ///
    /// # Errors
    ///
    /// Returns [`Validation`](AdminError::Validation) if a filter value does
    /// not decode for its column and [`NotFound`](AdminError::NotFound) if
    /// the table or the ordering column does not exist.
    pub fn browse(&self, table: &str, query: &TableQuery) -> Result<RowPage> {
        let meta = self.cache.get(self.conn, table)?;

        let filter = decode_fields(&meta.columns, &query.filter)
            .map_err(|fields| AdminError::validation("invalid filter", fields))?;
        let mut clauses = Vec::with_capacity(filter.len());
        let mut params = Vec::with_capacity(filter.len());
        for (column, value) in &filter {
            if value.is_null() {
                clauses.push(format!("{} IS NULL", quote_ident(column)));
            } else {
                params.push(convert::to_sql(value));
                clauses.push(format!("{} = ?{}", quote_ident(column), params.len()));
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        let order_sql = match &query.ordering {
            Some(ordering) => {
                let column = meta
                    .column(&ordering.column)
                    .ok_or_else(|| AdminError::not_found(EntityKind::Column, &ordering.column))?;
                format!(
                    " ORDER BY {} {}",
                    quote_ident(&column.name),
                    ordering.direction.as_sql()
                )
            }
            None => String::new(),
        };

        let from_sql = format!("FROM {}{where_sql}", quote_ident(table));
        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) {from_sql}"),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        let total = u64::try_from(total).unwrap_or(0);
        let pagination = Pagination::resolve(total, self.config.rows_per_page, query.page);

        let mut stmt = self.conn.prepare(&format!(
            "SELECT * {from_sql}{order_sql} LIMIT {} OFFSET {}",
            pagination.page_size,
            pagination.offset()
        ))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                convert::read_row(row, &columns, Some(&*meta))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let rows = rows
            .into_iter()
            .map(|values| PageRow {
                key: meta
                    .primary_key
                    .as_ref()
                    .map(|key| convert::row_token(&meta, key, &values)),
                values,
            })
            .collect();

        let sums = if total < self.config.sum_threshold {
            Some(self.column_sums(&meta, &from_sql, &params)?)
        } else {
            None
        };

        debug!(table, total, page = pagination.page, "browsed table");
        Ok(RowPage {
            table: table.to_string(),
            columns,
            rows,
            pagination,
            ordering: query.ordering.clone(),
            sums,
        })
    }

    fn column_sums(
        &self,
        meta: &TableMetadata,
        from_sql: &str,
        params: &[SqlValue],
    ) -> Result<BTreeMap<String, Value>> {
        let summable: Vec<&str> = meta
            .columns
            .iter()
            .filter(|c| c.family().is_summable())
            .map(|c| c.name.as_str())
            .collect();
        if summable.is_empty() {
            return Ok(BTreeMap::new());
        }

        let select: Vec<String> = summable
            .iter()
            .map(|c| format!("SUM({})", quote_ident(c)))
            .collect();
        let sql = format!("SELECT {} {from_sql}", select.join(", "));
        let sums = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| {
                summable
                    .iter()
                    .enumerate()
                    .map(|(i, name)| Ok((name.to_string(), convert::from_sql(row.get_ref(i)?))))
                    .collect::<rusqlite::Result<BTreeMap<_, _>>>()
            })?;
        Ok(sums)
    }

    /// Inserts one row from raw `(column, value)` input.
    ///
    /// Auto-generated key columns and unknown names are skipped. Either all
    /// values decode and the row is inserted, or nothing is written and every
    /// field error is reported.
    ///
    /// # Errors
    ///
    /// Returns [`MissingInput`](AdminError::MissingInput) if no usable value
    /// was submitted and [`Validation`](AdminError::Validation) with the
    /// per-field failures otherwise.
    pub fn insert(&self, table: &str, input: &[(String, String)]) -> Result<usize> {
        let meta = self.cache.get(self.conn, table)?;
        let editable = meta.columns.iter().filter(|c| !c.auto_increment);
        let values = decode_fields(editable, input)
            .map_err(|fields| AdminError::validation("invalid row values", fields))?;
        if values.is_empty() {
            return Err(AdminError::MissingInput("column values".to_string()));
        }

        let columns: Vec<String> = values.iter().map(|(c, _)| quote_ident(c)).collect();
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            columns.join(", "),
            placeholders.join(", ")
        );
        let params: Vec<SqlValue> = values.iter().map(|(_, v)| convert::to_sql(v)).collect();

        let tx = write_transaction(self.conn)?;
        let inserted = tx.execute(&sql, params_from_iter(params.iter()))?;
        tx.commit()?;
        info!(table, columns = values.len(), "inserted row");
        Ok(inserted)
    }

    /// Updates the row addressed by `token` from raw `(column, value)` input.
    ///
    /// # Errors
    ///
    /// Returns [`Validation`](AdminError::Validation) if the table has no
    /// primary key or a value does not decode, [`Key`](AdminError::Key) if
    /// the token is malformed and [`NotFound`](AdminError::NotFound) if no
    /// row matches.
    pub fn update(&self, table: &str, token: &str, input: &[(String, String)]) -> Result<usize> {
        let meta = self.cache.get(self.conn, table)?;
        let predicate = self.existing_row(&meta, token)?;
        let values = decode_fields(&meta.columns, input)
            .map_err(|fields| AdminError::validation("invalid row values", fields))?;
        if values.is_empty() {
            return Err(AdminError::MissingInput("column values".to_string()));
        }

        let assignments: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", quote_ident(column), i + 1))
            .collect();
        let (where_sql, _) = predicate.to_sql_from(values.len() + 1);
        let sql = format!(
            "UPDATE {} SET {} WHERE {where_sql}",
            quote_ident(table),
            assignments.join(", ")
        );
        let mut params: Vec<SqlValue> = values.iter().map(|(_, v)| convert::to_sql(v)).collect();
        params.extend(convert::key_params(&meta, &predicate));

        let tx = write_transaction(self.conn)?;
        let updated = tx.execute(&sql, params_from_iter(params.iter()))?;
        if updated == 0 {
            return Err(not_found_row(&meta, token));
        }
        tx.commit()?;
        info!(table, key = token, columns = values.len(), "updated row");
        Ok(updated)
    }

    /// Deletes the row addressed by `token`.
    pub fn delete(&self, table: &str, token: &str) -> Result<usize> {
        let meta = self.cache.get(self.conn, table)?;
        let predicate = self.existing_row(&meta, token)?;
        let (where_sql, _) = predicate.to_sql();
        let sql = format!("DELETE FROM {} WHERE {where_sql}", quote_ident(table));
        let params = convert::key_params(&meta, &predicate);

        let tx = write_transaction(self.conn)?;
        let deleted = tx.execute(&sql, params_from_iter(params.iter()))?;
        if deleted == 0 {
            return Err(not_found_row(&meta, token));
        }
        tx.commit()?;
        info!(table, key = token, "deleted row");
        Ok(deleted)
    }

    /// Loads the row addressed by `token`.
    pub fn fetch(&self, table: &str, token: &str) -> Result<Row> {
        let meta = self.cache.get(self.conn, table)?;
        let predicate = self.key_predicate(&meta, token)?;
        self.select_row(&meta, &predicate)?
            .ok_or_else(|| not_found_row(&meta, token))
    }

    /// Re-enterable text for each of the table's columns present in `row`,
    /// in column order.
    pub fn edit_values(&self, table: &str, row: &Row) -> Result<Vec<(String, String)>> {
        let meta = self.cache.get(self.conn, table)?;
        Ok(meta
            .columns
            .iter()
            .filter_map(|c| {
                row.get(&c.name)
                    .map(|value| (c.name.clone(), render_for_input(value)))
            })
            .collect())
    }

    fn key_predicate(&self, meta: &TableMetadata, token: &str) -> Result<KeyPredicate> {
        let key = meta.primary_key.as_ref().ok_or_else(|| {
            AdminError::validation(
                format!("{} has no primary key", meta.name),
                Default::default(),
            )
        })?;
        Ok(pk::decode(key, token)?)
    }

    fn existing_row(&self, meta: &TableMetadata, token: &str) -> Result<KeyPredicate> {
        let predicate = self.key_predicate(meta, token)?;
        let (where_sql, _) = predicate.to_sql();
        let sql = format!(
            "SELECT 1 FROM {} WHERE {where_sql} LIMIT 1",
            quote_ident(&meta.name)
        );
        let params = convert::key_params(meta, &predicate);
        let found: Option<i64> = self
            .conn
            .query_row(&sql, params_from_iter(params.iter()), |row| row.get(0))
            .optional()?;
        match found {
            Some(_) => Ok(predicate),
            None => Err(not_found_row(meta, token)),
        }
    }

    fn select_row(&self, meta: &TableMetadata, predicate: &KeyPredicate) -> Result<Option<Row>> {
        let (where_sql, _) = predicate.to_sql();
        let mut stmt = self.conn.prepare(&format!(
            "SELECT * FROM {} WHERE {where_sql}",
            quote_ident(&meta.name)
        ))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let params = convert::key_params(meta, predicate);
        let row = stmt
            .query_row(params_from_iter(params.iter()), |row| {
                convert::read_row(row, &columns, Some(meta))
            })
            .optional()?;
        Ok(row)
    }

    /// Cached metadata for `table`.
    pub fn metadata(&self, table: &str) -> Result<Arc<TableMetadata>> {
        self.cache.get(self.conn, table)
    }
}

fn not_found_row(meta: &TableMetadata, token: &str) -> AdminError {
    let shown = match &meta.primary_key {
        Some(key) => pk::display_key(key, token),
        None => token.to_string(),
    };
    AdminError::not_found(EntityKind::Row, format!("{} {shown}", meta.name))
}
