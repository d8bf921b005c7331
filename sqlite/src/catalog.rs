//! Read-only access to the database's own schema catalog.
//!
//! Everything here is answered from `sqlite_master` and the `pragma_*`
//! table-valued functions, so the results always reflect the file as it is
//! right now. Callers that want a stable per-request snapshot should go
//! through the [`MetadataCache`](crate::MetadataCache) instead.
//!
//! # Example
//!
//! ```no_run
//! use litebrowse_sqlite::Catalog;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let catalog = Catalog::new(&conn);
//!
//! for table in catalog.list_visible_tables().unwrap() {
//!     let columns = catalog.list_columns(&table).unwrap();
//!     println!("{table}: {} column(s)", columns.len());
//! }
//! ```

use std::collections::BTreeSet;
use std::sync::LazyLock;

use litebrowse_core::{
    Column, DeclaredType, ForeignKey, Index, PrimaryKey, TableMetadata, Trigger, View,
    ViewOperation,
};
use regex::Regex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use crate::error::{AdminError, EntityKind, Result};

/// Prefix identifying virtual tables; matched case-sensitively, as SQLite
/// normalizes the keywords when it stores the definition.
const VIRTUAL_TABLE_PREFIX: &str = "CREATE VIRTUAL TABLE";

/// Suffixes of the shadow tables full-text virtual tables keep alongside.
const SHADOW_SUFFIXES: [&str; 5] = ["content", "docsize", "segdir", "segments", "stat"];

static INSTEAD_OF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)CREATE\s+TRIGGER.+?\sINSTEAD\s+OF\s+(INSERT|UPDATE|DELETE)\s")
        .expect("static regex must compile")
});

/// Whether a name refers to a table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Table,
    View,
}

/// Query interface over the schema catalog.
///
/// Borrows a connection; every method is a read-only catalog query and
/// propagates engine failures as [`AdminError::Execution`].
pub struct Catalog<'a> {
    conn: &'a Connection,
}

impl<'a> Catalog<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Ordinary tables, name ascending, excluding SQLite's internal tables.
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Tables minus the shadow tables kept by virtual tables.
    pub fn list_visible_tables(&self) -> Result<Vec<String>> {
        let shadows = self.list_virtual_table_shadow_names()?;
        let mut tables = self.list_tables()?;
        tables.retain(|t| !shadows.contains(t));
        Ok(tables)
    }

    /// Returns whether `name` is a table, a view, or neither.
    pub fn relation_kind(&self, name: &str) -> Result<Option<RelationKind>> {
        let kind: Option<String> = self
            .conn
            .query_row(
                "SELECT type FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(kind.map(|k| {
            if k == "view" {
                RelationKind::View
            } else {
                RelationKind::Table
            }
        }))
    }

    pub fn table_exists(&self, name: &str) -> Result<bool> {
        Ok(self.relation_kind(name)? == Some(RelationKind::Table))
    }

    pub fn is_view(&self, name: &str) -> Result<bool> {
        Ok(self.relation_kind(name)? == Some(RelationKind::View))
    }

    /// Columns of a table or view in declaration order.
    ///
    /// A lone `INTEGER` primary-key column aliases the rowid and is flagged
    /// as auto-generated.
    pub fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk \
             FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let mut columns = stmt
            .query_map(params![table], |row| {
                let pk: i64 = row.get(4)?;
                Ok(Column {
                    name: row.get(0)?,
                    declared_type: DeclaredType::parse(&row.get::<_, String>(1)?),
                    nullable: row.get::<_, i64>(2)? == 0,
                    default_value: row.get(3)?,
                    primary_key_position: usize::try_from(pk).ok().filter(|p| *p > 0),
                    auto_increment: false,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let pk_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_primary_key())
            .map(|(i, _)| i)
            .collect();
        if let [only] = pk_columns[..] {
            let column = &mut columns[only];
            column.auto_increment = column.declared_type == DeclaredType::Integer;
        }
        Ok(columns)
    }

    /// Primary key of a table, from the column key positions.
    pub fn primary_key(&self, table: &str) -> Result<Option<PrimaryKey>> {
        Ok(primary_key_of(&self.list_columns(table)?))
    }

    /// Foreign keys declared on a table.
    ///
    /// A constraint that omits the parent column refers to the parent's
    /// primary key; that column is resolved here when the key is single.
    pub fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let mut stmt = self.conn.prepare(
            "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let raw = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut keys = Vec::with_capacity(raw.len());
        for (column, dest_table, dest_column) in raw {
            let dest_column = match dest_column {
                Some(c) => c,
                None => match self.primary_key(&dest_table)? {
                    Some(PrimaryKey::Single(c)) => c,
                    _ => "rowid".to_string(),
                },
            };
            keys.push(ForeignKey {
                column,
                dest_table,
                dest_column,
            });
        }
        Ok(keys)
    }

    /// Indexes owned by a table, name ascending.
    pub fn list_indexes(&self, table: &str) -> Result<Vec<Index>> {
        let mut stmt = self.conn.prepare(
            "SELECT il.name, il.\"unique\", m.sql \
             FROM pragma_index_list(?1) AS il \
             LEFT JOIN sqlite_master AS m ON m.type = 'index' AND m.name = il.name \
             ORDER BY il.name",
        )?;
        let raw = stmt
            .query_map(params![table], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? != 0,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut indexes = Vec::with_capacity(raw.len());
        for (name, unique, sql) in raw {
            let columns = self.index_columns(&name)?;
            indexes.push(Index {
                name,
                table: table.to_string(),
                sql,
                unique,
                columns,
            });
        }
        Ok(indexes)
    }

    /// Every index in the database, name ascending.
    pub fn list_all_indexes(&self) -> Result<Vec<Index>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT tbl_name FROM sqlite_master WHERE type = 'index' ORDER BY tbl_name",
        )?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut indexes = Vec::new();
        for table in &tables {
            indexes.extend(self.list_indexes(table)?);
        }
        indexes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(indexes)
    }

    // Expression columns have no name; the column list is unknown then.
    fn index_columns(&self, index: &str) -> Result<Option<Vec<String>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
        let names = stmt
            .query_map(params![index], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.into_iter().collect())
    }

    /// Triggers owned by `table`, or all triggers when `None`; name ascending.
    pub fn list_triggers(&self, table: Option<&str>) -> Result<Vec<Trigger>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, tbl_name, sql FROM sqlite_master \
             WHERE type = 'trigger' AND (?1 IS NULL OR tbl_name = ?1) ORDER BY name",
        )?;
        let triggers = stmt
            .query_map(params![table], |row| {
                Ok(Trigger {
                    name: row.get(0)?,
                    table: row.get(1)?,
                    sql: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(triggers)
    }

    /// All views, name ascending, with their supported operations.
    pub fn list_views(&self) -> Result<Vec<View>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE type = 'view' ORDER BY name")?;
        let raw = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(name, sql)| {
                let operations = self.view_operations(&name)?;
                Ok(View {
                    name,
                    sql,
                    operations,
                })
            })
            .collect()
    }

    /// Looks up a single view by name.
    pub fn get_view(&self, name: &str) -> Result<Option<View>> {
        let sql: Option<String> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE type = 'view' AND name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match sql {
            Some(sql) => Ok(Some(View {
                name: name.to_string(),
                sql,
                operations: self.view_operations(name)?,
            })),
            None => Ok(None),
        }
    }

    /// Names of virtual tables.
    pub fn list_virtual_tables(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, sql FROM sqlite_master WHERE type = 'table' AND sql IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows
            .into_iter()
            .filter(|(_, sql)| sql.starts_with(VIRTUAL_TABLE_PREFIX))
            .map(|(name, _)| name)
            .collect())
    }

    /// Companion table names a virtual table may keep for its bookkeeping.
    pub fn list_virtual_table_shadow_names(&self) -> Result<BTreeSet<String>> {
        Ok(shadow_names(&self.list_virtual_tables()?))
    }

    /// Stored `CREATE` statement of a table or view.
    pub fn defining_sql(&self, name: &str) -> Result<Option<String>> {
        let sql: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT sql FROM sqlite_master WHERE name = ?1 AND type IN ('table', 'view')",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(sql.flatten())
    }

    /// Operations a view accepts through its `INSTEAD OF` triggers.
    ///
    /// This is a text match on each trigger's SQL, not a parse; unusually
    /// formatted definitions may go unrecognized.
    pub fn view_operations(&self, view: &str) -> Result<BTreeSet<ViewOperation>> {
        let mut stmt = self
            .conn
            .prepare("SELECT sql FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ?1")?;
        let triggers = stmt
            .query_map(params![view], |row| row.get::<_, Option<String>>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(triggers
            .iter()
            .flatten()
            .flat_map(|sql| instead_of_operations(sql))
            .collect())
    }

    /// Loads the full metadata record for a table or view.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`] if no table or view has this name.
    pub fn load_table(&self, name: &str) -> Result<TableMetadata> {
        let kind = self
            .relation_kind(name)?
            .ok_or_else(|| AdminError::not_found(EntityKind::Table, name))?;
        let columns = self.list_columns(name)?;
        let primary_key = primary_key_of(&columns);
        let metadata = TableMetadata {
            name: name.to_string(),
            is_view: kind == RelationKind::View,
            foreign_keys: self.list_foreign_keys(name)?,
            indexes: self.list_indexes(name)?,
            triggers: self.list_triggers(Some(name))?,
            columns,
            primary_key,
        };
        debug!(
            table = name,
            columns = metadata.columns.len(),
            indexes = metadata.indexes.len(),
            "loaded table metadata"
        );
        Ok(metadata)
    }
}

fn primary_key_of(columns: &[Column]) -> Option<PrimaryKey> {
    let mut keyed: Vec<(usize, &str)> = columns
        .iter()
        .filter_map(|c| c.primary_key_position.map(|p| (p, c.name.as_str())))
        .collect();
    keyed.sort_unstable();
    PrimaryKey::from_columns(keyed.into_iter().map(|(_, n)| n.to_string()).collect())
}

fn shadow_names(virtual_tables: &BTreeSet<String>) -> BTreeSet<String> {
    virtual_tables
        .iter()
        .flat_map(|vt| SHADOW_SUFFIXES.iter().map(move |s| format!("{vt}_{s}")))
        .collect()
}

fn instead_of_operations(sql: &str) -> Vec<ViewOperation> {
    INSTEAD_OF_RE
        .captures_iter(sql)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| ViewOperation::from_keyword(m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
            CREATE TABLE books (
                id INTEGER PRIMARY KEY,
                title TEXT,
                author_id INTEGER REFERENCES authors,
                price REAL DEFAULT 0
            );
            CREATE INDEX books_title ON books (title);
            CREATE TABLE tags (book_id INTEGER, tag TEXT, PRIMARY KEY (book_id, tag));
            CREATE VIEW cheap AS SELECT * FROM books WHERE price < 5;
            "#,
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_list_tables_sorted() {
        let conn = setup();
        let tables = Catalog::new(&conn).list_tables().unwrap();
        assert_eq!(tables, ["authors", "books", "tags"]);
    }

    #[test]
    fn test_columns_and_auto_increment() {
        let conn = setup();
        let columns = Catalog::new(&conn).list_columns("books").unwrap();
        assert_eq!(columns.len(), 4);
        assert!(columns[0].auto_increment);
        assert_eq!(columns[3].declared_type, DeclaredType::Real);
        assert_eq!(columns[3].default_value.as_deref(), Some("0"));

        let tags = Catalog::new(&conn).list_columns("tags").unwrap();
        assert!(tags.iter().all(|c| !c.auto_increment));
    }

    #[test]
    fn test_composite_primary_key() {
        let conn = setup();
        let pk = Catalog::new(&conn).primary_key("tags").unwrap();
        assert_eq!(
            pk,
            Some(PrimaryKey::Composite(vec!["book_id".into(), "tag".into()]))
        );
    }

    #[test]
    fn test_foreign_key_resolves_implicit_parent_column() {
        let conn = setup();
        let fks = Catalog::new(&conn).list_foreign_keys("books").unwrap();
        assert_eq!(
            fks,
            vec![ForeignKey {
                column: "author_id".into(),
                dest_table: "authors".into(),
                dest_column: "id".into(),
            }]
        );
    }

    #[test]
    fn test_indexes_with_columns() {
        let conn = setup();
        let catalog = Catalog::new(&conn);
        let indexes = catalog.list_indexes("books").unwrap();
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].columns, Some(vec!["title".to_string()]));
        assert!(!indexes[0].unique);

        // The composite key on `tags` is backed by an automatic index.
        let all = catalog.list_all_indexes().unwrap();
        assert!(all.iter().any(|i| i.table == "tags" && i.sql.is_none() && i.unique));
    }

    #[test]
    fn test_relation_kind() {
        let conn = setup();
        let catalog = Catalog::new(&conn);
        assert_eq!(catalog.relation_kind("books").unwrap(), Some(RelationKind::Table));
        assert_eq!(catalog.relation_kind("cheap").unwrap(), Some(RelationKind::View));
        assert_eq!(catalog.relation_kind("nope").unwrap(), None);
    }

    #[test]
    fn test_defining_sql() {
        let conn = setup();
        let sql = Catalog::new(&conn).defining_sql("cheap").unwrap().unwrap();
        assert!(sql.starts_with("CREATE VIEW cheap"));
        assert_eq!(Catalog::new(&conn).defining_sql("missing").unwrap(), None);
    }

    #[test]
    fn test_shadow_names() {
        let vts: BTreeSet<String> = ["docs".to_string()].into();
        let shadows = shadow_names(&vts);
        assert_eq!(shadows.len(), 5);
        assert!(shadows.contains("docs_segdir"));
        assert!(shadows.contains("docs_stat"));
    }

    #[test]
    fn test_instead_of_heuristic() {
        let sql = "CREATE TRIGGER t INSTEAD OF INSERT ON v BEGIN SELECT 1; END";
        assert_eq!(instead_of_operations(sql), vec![ViewOperation::Insert]);

        let lower = "create trigger t\ninstead of delete on v begin select 1; end";
        assert_eq!(instead_of_operations(lower), vec![ViewOperation::Delete]);

        let plain = "CREATE TRIGGER t AFTER UPDATE ON v BEGIN SELECT 1; END";
        assert!(instead_of_operations(plain).is_empty());
    }

    #[test]
    fn test_view_operations_from_triggers() {
        let conn = setup();
        conn.execute_batch(
            "CREATE TRIGGER cheap_ins INSTEAD OF INSERT ON cheap BEGIN \
             INSERT INTO books (title, price) VALUES (NEW.title, NEW.price); END;",
        )
        .unwrap();
        let catalog = Catalog::new(&conn);
        let view = catalog.get_view("cheap").unwrap().unwrap();
        assert_eq!(view.operations, BTreeSet::from([ViewOperation::Insert]));
        assert_eq!(catalog.list_views().unwrap().len(), 1);
        assert_eq!(catalog.list_triggers(Some("cheap")).unwrap().len(), 1);
        assert!(catalog.list_triggers(Some("books")).unwrap().is_empty());
    }

    #[test]
    fn test_load_table_missing_is_not_found() {
        let conn = setup();
        let err = Catalog::new(&conn).load_table("ghost").unwrap_err();
        assert!(matches!(err, AdminError::NotFound { .. }));
    }
}
