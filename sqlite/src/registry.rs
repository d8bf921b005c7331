//! Process-wide bookkeeping of open database handles.
//!
//! Every [`Session`](crate::Session) registers here when it opens its
//! connection and deregisters when dropped. The registry is a single map
//! behind one mutex; it records lifecycle only and never touches the
//! connections themselves.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::database::OpenMode;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

static REGISTRY: LazyLock<Mutex<BTreeMap<HandleId, HandleInfo>>> =
    LazyLock::new(|| Mutex::new(BTreeMap::new()));

/// Identifier of a registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct HandleId(u64);

/// Record of one open handle.
#[derive(Debug, Clone, Serialize)]
pub struct HandleInfo {
    pub id: HandleId,
    pub path: PathBuf,
    pub mode: OpenMode,
    pub opened_at: DateTime<Local>,
}

// Entries are inserted and removed whole, so a panic while the lock was held
// cannot leave a half-written entry behind.
fn lock() -> MutexGuard<'static, BTreeMap<HandleId, HandleInfo>> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records a newly opened handle and returns its id.
pub fn register(path: &Path, mode: OpenMode) -> HandleId {
    let id = HandleId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    let info = HandleInfo {
        id,
        path: path.to_path_buf(),
        mode,
        opened_at: Local::now(),
    };
    lock().insert(id, info);
    debug!(handle = id.0, path = %path.display(), "registered database handle");
    id
}

/// Removes a handle; returns `false` if it was not registered.
pub fn deregister(id: HandleId) -> bool {
    let removed = lock().remove(&id).is_some();
    debug!(handle = id.0, removed, "deregistered database handle");
    removed
}

/// Snapshot of all currently open handles, oldest first.
pub fn open_handles() -> Vec<HandleInfo> {
    lock().values().cloned().collect()
}

/// Number of handles currently open against `path`.
pub fn open_count(path: &Path) -> usize {
    lock().values().filter(|info| info.path == path).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_deregister() {
        let path = Path::new("/tmp/litebrowse-registry-test.db");
        let id = register(path, OpenMode::ReadOnly);
        assert!(open_handles().iter().any(|h| h.id == id && h.path == path));
        assert!(deregister(id));
        assert!(!open_handles().iter().any(|h| h.id == id));
        assert!(!deregister(id));
    }

    #[test]
    fn test_ids_are_unique() {
        let path = Path::new("/tmp/litebrowse-registry-unique.db");
        let a = register(path, OpenMode::ReadWrite);
        let b = register(path, OpenMode::ReadWrite);
        assert_ne!(a, b);
        assert_eq!(open_count(path), 2);
        deregister(a);
        deregister(b);
        assert_eq!(open_count(path), 0);
    }
}
