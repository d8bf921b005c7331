//! SQLite administration layer.
//!
//! This crate reads a database's schema catalog, applies structural changes
//! safely, and browses and edits rows through the codecs in
//! [`litebrowse_core`]. It works on exactly one database file per
//! [`Database`].
//!
//! # Architecture
//!
//! - **`database`**: [`Database`] (shared, `Send + Sync`) and per-request
//!   [`Session`]s, each holding its own connection
//! - **`catalog`**: read-only queries over `sqlite_master` and `pragma_*`
//! - **`cache`**: per-table [`TableMetadata`](litebrowse_core::TableMetadata)
//!   shared by all sessions, refreshed after every structural change
//! - **`mutate`**: add/drop/rename columns, indexes, triggers and tables
//! - **`rows`**: paging, filtering, sums, insert/update/delete by key token
//! - **`summary`**: labels for small foreign-key targets
//! - **`query`**: capped ad-hoc SQL with captured errors
//! - **`transfer`**: JSON and CSV import/export
//! - **`registry`**: process-wide record of open sessions
//!
//! # Quick start
//!
//! ```no_run
//! use litebrowse_sqlite::{AddColumn, AdminConfig, Database, OpenMode, TableQuery};
//!
//! let db = Database::open("app.db", OpenMode::ReadWrite, AdminConfig::default()).unwrap();
//! let session = db.session().unwrap();
//!
//! session
//!     .mutator()
//!     .add_column("users", &AddColumn::new("age", "INTEGER"))
//!     .unwrap();
//!
//! let page = session.rows().browse("users", &TableQuery::default()).unwrap();
//! for row in &page.rows {
//!     println!("{:?}: {:?}", row.key, row.values);
//! }
//! ```
//!
//! # Consistency
//!
//! Validation and existence checks run before any transaction opens. DDL and
//! DML run inside a transaction that rolls back on error. The metadata cache
//! entry for a table is refreshed after a successful commit and before the
//! mutating call returns.

mod cache;
mod catalog;
mod config;
mod convert;
mod database;
mod error;
mod mutate;
mod query;
pub mod registry;
mod rows;
mod summary;
mod transfer;

pub use cache::MetadataCache;
pub use catalog::{Catalog, RelationKind};
pub use config::AdminConfig;
pub use database::{Database, DatabaseInfo, OpenMode, Session};
pub use error::{AdminError, EntityKind, ErrorKind, Result};
pub use mutate::{AddColumn, ForeignKeyTarget, StructuralMutator};
pub use query::{QueryOutcome, ordered_sql, query_rows, run_query};
pub use rows::{Direction, Ordering, PageRow, RowAccess, RowPage, TableQuery};
pub use summary::{ForeignKeySummary, MAX_LABEL_LENGTH};
pub use transfer::{Export, ExportFormat, ImportFormat, Transfer, export_filename};
