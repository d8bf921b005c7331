//! Database handle and per-request sessions.
//!
//! A [`Database`] names one SQLite file and owns everything shared between
//! requests: the open mode, the [`AdminConfig`] and the [`MetadataCache`].
//! Each request opens a [`Session`], which holds its own connection to the
//! file and hands out the catalog, mutation, row and transfer interfaces.
//!
//! # Example
//!
//! ```no_run
//! use litebrowse_sqlite::{AdminConfig, Database, OpenMode};
//!
//! let db = Database::open("app.db", OpenMode::ReadWrite, AdminConfig::default()).unwrap();
//! let session = db.session().unwrap();
//!
//! for table in session.catalog().list_visible_tables().unwrap() {
//!     let meta = session.metadata(&table).unwrap();
//!     println!("{table}: {:?}", meta.primary_key);
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use litebrowse_core::TableMetadata;
use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::debug;

use crate::cache::MetadataCache;
use crate::catalog::Catalog;
use crate::config::AdminConfig;
use crate::error::{AdminError, Result};
use crate::mutate::StructuralMutator;
use crate::query::{self, QueryOutcome};
use crate::registry::{self, HandleId};
use crate::rows::RowAccess;
use crate::transfer::Transfer;

/// How connections to the file are opened; fixed for the life of a
/// [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    ReadWrite,
    ReadOnly,
}

impl OpenMode {
    fn flags(self) -> OpenFlags {
        match self {
            Self::ReadWrite => OpenFlags::default(),
            Self::ReadOnly => {
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX
            }
        }
    }
}

/// Opens a write transaction on a shared connection.
///
/// `IMMEDIATE` takes the write lock up front, so a busy database is waited
/// on through the busy timeout instead of failing when a read lock would
/// have to be upgraded mid-transaction.
pub(crate) fn write_transaction(conn: &Connection) -> rusqlite::Result<Transaction<'_>> {
    Transaction::new_unchecked(conn, TransactionBehavior::Immediate)
}

/// Facts about the database file itself.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    pub filename: String,
    pub path: PathBuf,
    pub read_only: bool,
    /// Size on disk in bytes.
    pub size: u64,
    /// Not every filesystem records a creation time.
    pub created: Option<DateTime<Local>>,
    pub modified: Option<DateTime<Local>>,
    pub sqlite_version: String,
}

/// One SQLite file plus the state shared by every session against it.
///
/// `Database` is `Send + Sync`; share it by reference and open a
/// [`Session`] per request.
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    mode: OpenMode,
    config: AdminConfig,
    cache: MetadataCache,
}

impl Database {
    /// Opens (and in read-write mode, creates) the database at `path`.
    ///
    /// A probe connection is opened and closed so that a bad path fails
    /// here rather than on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::InvalidInput`] if a read-only database does not
    /// exist or the configuration is out of range, and
    /// [`AdminError::Execution`] if SQLite cannot open the file.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode, config: AdminConfig) -> Result<Self> {
        let path = path.as_ref();
        config.validate()?;
        if mode == OpenMode::ReadOnly && !path.exists() {
            return Err(AdminError::InvalidInput(format!(
                "database file does not exist: {}",
                path.display()
            )));
        }

        let probe = Connection::open_with_flags(path, mode.flags())?;
        drop(probe);
        let path = std::fs::canonicalize(path)?;
        debug!(path = %path.display(), ?mode, "opened database");

        Ok(Self {
            path,
            mode,
            config,
            cache: MetadataCache::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }

    pub fn config(&self) -> &AdminConfig {
        &self.config
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    /// Opens a new connection for one request.
    ///
    /// The connection enforces foreign keys and waits up to
    /// [`AdminConfig::busy_timeout_ms`] on a locked file.
    pub fn session(&self) -> Result<Session<'_>> {
        let conn = Connection::open_with_flags(&self.path, self.mode.flags())?;
        conn.busy_timeout(self.config.busy_timeout())?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let handle = registry::register(&self.path, self.mode);
        Ok(Session {
            db: self,
            conn,
            handle,
        })
    }

    /// File name, size, timestamps and engine version.
    pub fn info(&self) -> Result<DatabaseInfo> {
        let meta = std::fs::metadata(&self.path)?;
        let filename = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(DatabaseInfo {
            filename,
            path: self.path.clone(),
            read_only: self.is_read_only(),
            size: meta.len(),
            created: meta.created().ok().map(DateTime::<Local>::from),
            modified: meta.modified().ok().map(DateTime::<Local>::from),
            sqlite_version: rusqlite::version().to_string(),
        })
    }
}

/// A connection to a [`Database`] for the duration of one request.
///
/// Dropping the session closes the connection and removes it from the
/// handle registry.
pub struct Session<'db> {
    db: &'db Database,
    conn: Connection,
    handle: HandleId,
}

impl<'db> Session<'db> {
    pub fn database(&self) -> &'db Database {
        self.db
    }

    /// The underlying connection, for statements outside the admin API.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn catalog(&self) -> Catalog<'_> {
        Catalog::new(&self.conn)
    }

    pub fn mutator(&self) -> StructuralMutator<'_> {
        StructuralMutator::new(&self.conn, &self.db.cache)
    }

    pub fn rows(&self) -> RowAccess<'_> {
        RowAccess::new(&self.conn, &self.db.cache, &self.db.config)
    }

    pub fn transfer(&self) -> Transfer<'_> {
        Transfer::new(&self.conn, &self.db.cache)
    }

    /// Cached metadata for `table`, loaded on first use.
    pub fn metadata(&self, table: &str) -> Result<Arc<TableMetadata>> {
        self.db.cache.get(&self.conn, table)
    }

    /// Runs an ad-hoc statement, capped at
    /// [`AdminConfig::max_result_size`] rows.
    ///
    /// Statements that may write drop every cached table, since ad-hoc DDL
    /// can change any table's columns, keys or indexes.
    pub fn run_query(&self, sql: &str, ordering: Option<i64>) -> QueryOutcome {
        let outcome = query::run_query(&self.conn, sql, ordering, self.db.config.max_result_size);
        if outcome.writes {
            self.db.cache.invalidate_all();
        }
        outcome
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        registry::deregister(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_database_is_send_sync() {
        assert_send_sync::<Database>();
    }

    #[test]
    fn test_session_registers_and_deregisters() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(
            dir.path().join("app.db"),
            OpenMode::ReadWrite,
            AdminConfig::default(),
        )
        .unwrap();

        let session = db.session().unwrap();
        let handle = session.handle();
        assert!(registry::open_handles().iter().any(|h| h.id == handle));
        drop(session);
        assert!(!registry::open_handles().iter().any(|h| h.id == handle));
    }

    #[test]
    fn test_read_only_requires_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Database::open(
            dir.path().join("missing.db"),
            OpenMode::ReadOnly,
            AdminConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AdminError::InvalidInput(_)));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY);")
            .unwrap();

        let db = Database::open(&path, OpenMode::ReadOnly, AdminConfig::default()).unwrap();
        let session = db.session().unwrap();
        assert_eq!(session.catalog().list_tables().unwrap(), ["t"]);
        assert!(session.conn().execute("INSERT INTO t DEFAULT VALUES", []).is_err());
    }

    #[test]
    fn test_info() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(
            dir.path().join("info.db"),
            OpenMode::ReadWrite,
            AdminConfig::default(),
        )
        .unwrap();
        let info = db.info().unwrap();
        assert_eq!(info.filename, "info.db");
        assert!(!info.read_only);
        assert!(!info.sqlite_version.is_empty());
    }
}
