//! Shared per-table metadata cache.
//!
//! Entries are loaded lazily through the [`Catalog`] and replaced whole, so
//! readers holding an `Arc` keep a consistent snapshot while a structural
//! change swaps in the refreshed record.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use litebrowse_core::TableMetadata;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::catalog::Catalog;
use crate::error::Result;

type Entries = HashMap<String, Arc<TableMetadata>>;

/// Table name to [`TableMetadata`] map shared by every session of a
/// [`Database`](crate::Database).
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<Entries>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    // Writers only insert or remove complete entries, so a poisoned lock
    // still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Entries> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached metadata for `table`, loading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::NotFound`](crate::AdminError::NotFound) if the
    /// table does not exist, or an execution error from the catalog.
    pub fn get(&self, conn: &Connection, table: &str) -> Result<Arc<TableMetadata>> {
        if let Some(hit) = self.read().get(table) {
            return Ok(Arc::clone(hit));
        }
        self.refresh(conn, table)
    }

    /// Reloads `table` from the catalog and replaces its entry.
    ///
    /// The write lock is held across the catalog read, so of two concurrent
    /// refreshes the one that stores last also read last.
    pub fn refresh(&self, conn: &Connection, table: &str) -> Result<Arc<TableMetadata>> {
        let mut entries = self.write();
        let metadata = Arc::new(Catalog::new(conn).load_table(table)?);
        entries.insert(table.to_string(), Arc::clone(&metadata));
        drop(entries);
        debug!(table, "refreshed metadata cache entry");
        Ok(metadata)
    }

    /// Reloads `table` after a committed change.
    ///
    /// The old entry is removed even when the reload fails, in which case
    /// the failure is logged and the next `get` loads the table again.
    pub fn reload(&self, conn: &Connection, table: &str) {
        let mut entries = self.write();
        entries.remove(table);
        match Catalog::new(conn).load_table(table) {
            Ok(metadata) => {
                entries.insert(table.to_string(), Arc::new(metadata));
                debug!(table, "reloaded metadata cache entry");
            }
            Err(err) => warn!(table, error = %err, "metadata reload failed, entry dropped"),
        }
    }

    /// Drops the entry for `table`; the next `get` reloads it.
    pub fn invalidate(&self, table: &str) {
        if self.write().remove(table).is_some() {
            debug!(table, "invalidated metadata cache entry");
        }
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.write();
        debug!(entries = entries.len(), "cleared metadata cache");
        entries.clear();
    }

    pub fn contains(&self, table: &str) -> bool {
        self.read().contains_key(table)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
