//! Schema changes: columns, indexes, triggers and whole tables.
//!
//! Every operation follows the same sequence. Preconditions are checked
//! against a fresh catalog read, then the DDL runs inside a transaction,
//! and only after a successful commit is the table's cache entry refreshed.
//! A failed statement rolls the transaction back and leaves the cache as it
//! was.

use litebrowse_core::{
    DeclaredType, FieldErrors, TableMetadata, TypeFamily, decode, is_valid_identifier,
    quote_ident,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::MetadataCache;
use crate::catalog::{Catalog, RelationKind};
use crate::convert::sql_literal;
use crate::database::write_transaction;
use crate::error::{AdminError, EntityKind, Result};

/// Column referenced by a new foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub column: String,
}

/// Description of a column to add.
///
/// `declared_type` is the raw type name as submitted; it must be one of
/// [`DeclaredType::VOCABULARY`] unless a foreign-key target supplies the
/// type instead. `default` is raw text decoded like any other input value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddColumn {
    pub name: String,
    pub declared_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub foreign_key: Option<ForeignKeyTarget>,
}

impl AddColumn {
    /// A nullable column of the given type with no default.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            default: None,
            foreign_key: None,
        }
    }
}

/// Applies structural changes and keeps the [`MetadataCache`] in step.
pub struct StructuralMutator<'a> {
    conn: &'a Connection,
    cache: &'a MetadataCache,
}

impl<'a> StructuralMutator<'a> {
    pub fn new(conn: &'a Connection, cache: &'a MetadataCache) -> Self {
        Self { conn, cache }
    }

    fn catalog(&self) -> Catalog<'a> {
        Catalog::new(self.conn)
    }

    /// Loads `table` fresh from the catalog; views cannot be altered.
    fn load_table(&self, table: &str) -> Result<TableMetadata> {
        let meta = self.catalog().load_table(table)?;
        if meta.is_view {
            return Err(AdminError::InvalidInput(format!(
                "{table} is a view and cannot be altered"
            )));
        }
        Ok(meta)
    }

    // Runs `sql` in one transaction, then refreshes the cached entry.
    fn apply(&self, table: &str, action: &str, sql: &str) -> Result<()> {
        let tx = write_transaction(self.conn)?;
        if let Err(err) = tx.execute_batch(sql) {
            warn!(table, action, error = %err, "structural change rolled back");
            return Err(err.into());
        }
        tx.commit()?;
        info!(table, action, "applied structural change");
        self.cache.reload(self.conn, table);
        Ok(())
    }

    /// Adds a column to `table`.
    ///
    /// With a foreign-key target the column takes the referenced column's
    /// declared type and a `REFERENCES` clause.
    ///
    /// # Errors
    ///
    /// - [`MissingInput`](AdminError::MissingInput) if the name is empty, or
    ///   the column is `NOT NULL` without a default
    /// - [`Validation`](AdminError::Validation) if the type is outside the
    ///   vocabulary or the default does not decode
    /// - [`Conflict`](AdminError::Conflict) if the name is taken
    /// - [`NotFound`](AdminError::NotFound) if the table or the foreign-key
    ///   target does not exist
    pub fn add_column(&self, table: &str, column: &AddColumn) -> Result<()> {
        require_name("column name", &column.name)?;
        let meta = self.load_table(table)?;
        if find_column(&meta, &column.name).is_some() {
            return Err(AdminError::Conflict(format!(
                "column {} already exists on {table}",
                column.name
            )));
        }

        let (declared_type, references) = match &column.foreign_key {
            Some(target) => {
                let dest = self.catalog().load_table(&target.table)?;
                let dest_column = dest.column(&target.column).ok_or_else(|| {
                    AdminError::not_found(
                        EntityKind::Column,
                        format!("{}.{}", target.table, target.column),
                    )
                })?;
                let clause = format!(
                    " REFERENCES {} ({})",
                    quote_ident(&target.table),
                    quote_ident(&target.column)
                );
                (dest_column.declared_type.clone(), clause)
            }
            None => {
                let declared = DeclaredType::from_vocabulary(&column.declared_type).ok_or_else(
                    || {
                        AdminError::validation(
                            format!("unsupported column type: {}", column.declared_type),
                            FieldErrors::new(),
                        )
                    },
                )?;
                (declared, String::new())
            }
        };

        let default = match column.default.as_deref() {
            Some(raw) => match decode(&declared_type, column.nullable, raw) {
                Ok(value) => Some(sql_literal(&value)),
                Err(err) => {
                    let mut fields = FieldErrors::new();
                    fields.insert(column.name.clone(), err);
                    return Err(AdminError::validation("invalid default value", fields));
                }
            },
            None => None,
        };
        if !column.nullable && default.is_none() {
            return Err(AdminError::MissingInput(format!(
                "default value for NOT NULL column {}",
                column.name
            )));
        }

        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            quote_ident(&column.name)
        );
        if declared_type.family() != TypeFamily::Untyped {
            sql.push(' ');
            sql.push_str(declared_type.as_sql());
        }
        if !column.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }
        sql.push_str(&references);

        self.apply(table, "add_column", &sql)
    }

    /// Drops a column, first dropping every explicit index that covers it.
    pub fn drop_column(&self, table: &str, name: &str) -> Result<()> {
        let meta = self.load_table(table)?;
        let column = find_column(&meta, name)
            .ok_or_else(|| AdminError::not_found(EntityKind::Column, name))?;

        let mut sql = String::new();
        for index in meta.indexes.iter().filter(|i| i.sql.is_some() && i.covers(column)) {
            sql.push_str(&format!("DROP INDEX {};\n", quote_ident(&index.name)));
        }
        sql.push_str(&format!(
            "ALTER TABLE {} DROP COLUMN {};",
            quote_ident(table),
            quote_ident(column)
        ));

        self.apply(table, "drop_column", &sql)
    }

    /// Renames column `old` to `new`.
    ///
    /// # Errors
    ///
    /// Returns [`MissingInput`](AdminError::MissingInput) if either name is
    /// empty, [`NotFound`](AdminError::NotFound) if `old` does not exist, and
    /// [`Conflict`](AdminError::Conflict) if `new` already does.
    pub fn rename_column(&self, table: &str, old: &str, new: &str) -> Result<()> {
        require_name("current column name", old)?;
        require_name("new column name", new)?;
        let meta = self.load_table(table)?;
        let column = find_column(&meta, old)
            .ok_or_else(|| AdminError::not_found(EntityKind::Column, old))?;
        if find_column(&meta, new).is_some_and(|existing| existing != column) {
            return Err(AdminError::Conflict(format!(
                "column {new} already exists on {table}"
            )));
        }

        let sql = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(column),
            quote_ident(new)
        );
        self.apply(table, "rename_column", &sql)?;
        // Foreign keys in other tables now name the new column.
        self.cache.invalidate_all();
        Ok(())
    }

    /// Creates an index over `columns` and returns its generated name,
    /// `{table}_{col1}_{col2}…`.
    pub fn add_index(&self, table: &str, columns: &[String], unique: bool) -> Result<String> {
        if columns.is_empty() {
            return Err(AdminError::MissingInput("index columns".to_string()));
        }
        let meta = self.load_table(table)?;
        let mut quoted = Vec::with_capacity(columns.len());
        for name in columns {
            let column = find_column(&meta, name)
                .ok_or_else(|| AdminError::not_found(EntityKind::Column, name.as_str()))?;
            quoted.push(quote_ident(column));
        }

        let index_name = index_name(table, columns);
        let taken = self
            .catalog()
            .list_all_indexes()?
            .iter()
            .any(|i| i.name.eq_ignore_ascii_case(&index_name));
        if taken {
            return Err(AdminError::Conflict(format!(
                "index {index_name} already exists"
            )));
        }

        let sql = format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            quote_ident(&index_name),
            quote_ident(table),
            quoted.join(", ")
        );
        self.apply(table, "add_index", &sql)?;
        Ok(index_name)
    }

    /// Drops an index belonging to `table`.
    pub fn drop_index(&self, table: &str, name: &str) -> Result<()> {
        let meta = self.load_table(table)?;
        if meta.index(name).is_none() {
            return Err(AdminError::not_found(EntityKind::Index, name));
        }
        let sql = format!("DROP INDEX {}", quote_ident(name));
        self.apply(table, "drop_index", &sql)
    }

    /// Drops a trigger attached to `table`, which may be a view.
    pub fn drop_trigger(&self, table: &str, name: &str) -> Result<()> {
        let meta = self.catalog().load_table(table)?;
        if !meta.triggers.iter().any(|t| t.name == name) {
            return Err(AdminError::not_found(EntityKind::Trigger, name));
        }
        let sql = format!("DROP TRIGGER {}", quote_ident(name));
        self.apply(table, "drop_trigger", &sql)
    }

    /// Drops a table, or a view when `name` is one.
    ///
    /// Other tables may have referred to it, so the whole cache is cleared.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        let kind = self
            .catalog()
            .relation_kind(name)?
            .ok_or_else(|| AdminError::not_found(EntityKind::Table, name))?;
        let sql = match kind {
            RelationKind::Table => format!("DROP TABLE {}", quote_ident(name)),
            RelationKind::View => format!("DROP VIEW {}", quote_ident(name)),
        };

        let tx = write_transaction(self.conn)?;
        if let Err(err) = tx.execute_batch(&sql) {
            warn!(table = name, error = %err, "drop rolled back");
            return Err(err.into());
        }
        tx.commit()?;
        info!(table = name, ?kind, "dropped relation");
        self.cache.invalidate_all();
        Ok(())
    }

    /// Creates `name` with a single `id INTEGER PRIMARY KEY` column.
    ///
    /// Returns `false` if a table or view of that name already exists.
    pub fn create_table(&self, name: &str) -> Result<bool> {
        require_name("table name", name)?;
        if self.catalog().relation_kind(name)?.is_some() {
            return Ok(false);
        }
        let sql = format!("CREATE TABLE {} (id INTEGER PRIMARY KEY)", quote_ident(name));
        self.apply(name, "create_table", &sql)?;
        Ok(true)
    }
}

fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(AdminError::MissingInput(what.to_string()));
    }
    if !is_valid_identifier(name) {
        return Err(AdminError::InvalidInput(format!("{what} is not a valid identifier")));
    }
    Ok(())
}

// SQLite compares column names case-insensitively.
fn find_column<'m>(meta: &'m TableMetadata, name: &str) -> Option<&'m str> {
    meta.columns
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| c.name.as_str())
}

fn index_name(table: &str, columns: &[String]) -> String {
    format!("{table}_{}", columns.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> (Connection, MetadataCache) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, email TEXT);
            CREATE INDEX people_email ON people (email);
            CREATE TABLE pets (id INTEGER PRIMARY KEY, name TEXT);
            "#,
        )
        .unwrap();
        (conn, MetadataCache::new())
    }

    #[test]
    fn test_add_column_refreshes_cache() {
        let (conn, cache) = setup();
        cache.get(&conn, "people").unwrap();
        let mutator = StructuralMutator::new(&conn, &cache);
        mutator
            .add_column("people", &AddColumn::new("age", "INTEGER"))
            .unwrap();

        let meta = cache.get(&conn, "people").unwrap();
        let age = meta.column("age").unwrap();
        assert_eq!(age.declared_type, DeclaredType::Integer);
        assert!(age.nullable);
    }

    #[test]
    fn test_add_column_with_default_and_not_null() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        let column = AddColumn {
            nullable: false,
            default: Some("it's".to_string()),
            ..AddColumn::new("nickname", "TEXT")
        };
        mutator.add_column("people", &column).unwrap();
        let meta = cache.get(&conn, "people").unwrap();
        assert_eq!(
            meta.column("nickname").unwrap().default_value.as_deref(),
            Some("'it''s'")
        );

        let missing = AddColumn {
            nullable: false,
            ..AddColumn::new("rank", "INTEGER")
        };
        assert!(matches!(
            mutator.add_column("people", &missing),
            Err(AdminError::MissingInput(_))
        ));
    }

    #[test]
    fn test_add_column_rejections() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);

        let err = mutator
            .add_column("people", &AddColumn::new("", "TEXT"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = mutator
            .add_column("people", &AddColumn::new("x", "GEOMETRY"))
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));

        let err = mutator
            .add_column("people", &AddColumn::new("Name", "TEXT"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = mutator
            .add_column("ghosts", &AddColumn::new("x", "TEXT"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_add_foreign_key_column_takes_target_type() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        let column = AddColumn {
            foreign_key: Some(ForeignKeyTarget {
                table: "people".into(),
                column: "id".into(),
            }),
            ..AddColumn::new("owner_id", "TEXT")
        };
        mutator.add_column("pets", &column).unwrap();

        let meta = cache.get(&conn, "pets").unwrap();
        assert_eq!(
            meta.column("owner_id").unwrap().declared_type,
            DeclaredType::Integer
        );
        assert_eq!(meta.foreign_key("owner_id").unwrap().dest_table, "people");

        let bad = AddColumn {
            foreign_key: Some(ForeignKeyTarget {
                table: "people".into(),
                column: "nope".into(),
            }),
            ..AddColumn::new("other_id", "INTEGER")
        };
        assert_eq!(
            mutator.add_column("pets", &bad).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_drop_indexed_column() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        mutator.drop_column("people", "email").unwrap();

        let meta = cache.get(&conn, "people").unwrap();
        assert!(!meta.has_column("email"));
        assert!(meta.indexes.is_empty());

        let err = mutator.drop_column("people", "email").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_rename_column_conflict_leaves_both() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        let err = mutator.rename_column("people", "name", "email").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let meta = Catalog::new(&conn).load_table("people").unwrap();
        assert!(meta.has_column("name"));
        assert!(meta.has_column("email"));

        mutator.rename_column("people", "name", "full_name").unwrap();
        assert!(cache.get(&conn, "people").unwrap().has_column("full_name"));
    }

    #[test]
    fn test_rename_referenced_column_updates_referencing_tables() {
        let (conn, cache) = setup();
        conn.execute_batch(
            "CREATE TABLE visits (id INTEGER PRIMARY KEY, person INTEGER REFERENCES people (id));",
        )
        .unwrap();
        assert_eq!(
            cache.get(&conn, "visits").unwrap().foreign_keys[0].dest_column,
            "id"
        );

        let mutator = StructuralMutator::new(&conn, &cache);
        mutator.rename_column("people", "id", "person_id").unwrap();
        let visits = cache.get(&conn, "visits").unwrap();
        assert_eq!(visits.foreign_keys[0].dest_column, "person_id");
    }

    #[test]
    fn test_add_and_drop_index() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        let name = mutator
            .add_index("people", &["name".to_string(), "id".to_string()], true)
            .unwrap();
        assert_eq!(name, "people_name_id");

        let meta = cache.get(&conn, "people").unwrap();
        let index = meta.index(&name).unwrap();
        assert!(index.unique);
        assert_eq!(
            index.columns,
            Some(vec!["name".to_string(), "id".to_string()])
        );

        assert!(matches!(
            mutator.add_index("people", &[], false),
            Err(AdminError::MissingInput(_))
        ));
        assert_eq!(
            mutator
                .add_index("people", &["nope".to_string()], false)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );

        mutator.drop_index("people", &name).unwrap();
        assert!(cache.get(&conn, "people").unwrap().index(&name).is_none());
        assert_eq!(
            mutator.drop_index("people", &name).unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_drop_trigger() {
        let (conn, cache) = setup();
        conn.execute_batch(
            "CREATE TRIGGER people_touch AFTER UPDATE ON people BEGIN SELECT 1; END;",
        )
        .unwrap();
        let mutator = StructuralMutator::new(&conn, &cache);
        mutator.drop_trigger("people", "people_touch").unwrap();
        assert!(cache.get(&conn, "people").unwrap().triggers.is_empty());
        assert_eq!(
            mutator.drop_trigger("people", "people_touch").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_create_and_drop_table() {
        let (conn, cache) = setup();
        let mutator = StructuralMutator::new(&conn, &cache);
        assert!(mutator.create_table("notes").unwrap());
        assert!(!mutator.create_table("notes").unwrap());

        let meta = cache.get(&conn, "notes").unwrap();
        assert!(meta.column("id").unwrap().auto_increment);

        conn.execute_batch("CREATE VIEW named AS SELECT name FROM people;")
            .unwrap();
        mutator.drop_table("named").unwrap();
        mutator.drop_table("notes").unwrap();
        assert!(cache.is_empty());
        assert!(!Catalog::new(&conn).table_exists("notes").unwrap());
        assert_eq!(
            mutator.drop_table("notes").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_failed_ddl_leaves_cache_untouched() {
        let (conn, cache) = setup();
        let before = cache.get(&conn, "people").unwrap();
        let mutator = StructuralMutator::new(&conn, &cache);
        // The primary key cannot be dropped.
        let err = mutator.drop_column("people", "id").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Execution);
        let after = cache.get(&conn, "people").unwrap();
        assert!(std::sync::Arc::ptr_eq(&before, &after));
    }
}
