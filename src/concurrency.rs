//! Per-subtree locking
//!
//! Root propagation rewrites the cached root of a whole subtree in one batch.
//! Readers that combine several index reads for the same tree (root lookup
//! plus counts) take a read lock keyed by the root id; propagation takes the
//! write lock for both the old and the new root, so a reader sees either the
//! fully-old or the fully-new assignment.
//!
//! Every index write (walk write-back, propagation, invalidation) first takes
//! the writer gate. The set of roots a write touches is only known after
//! reading the index, so those reads and the write must not interleave with
//! another writer. Acquire the gate before any per-root lock.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-root lock manager
pub struct SubtreeLockManager {
    /// Map from root id to that tree's read-write lock
    locks: Arc<RwLock<HashMap<String, Arc<RwLock<()>>>>>,
    writer: Mutex<()>,
}

impl SubtreeLockManager {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(RwLock::new(HashMap::new())),
            writer: Mutex::new(()),
        }
    }

    /// Serialize index writers. Lookups served from the index never take it.
    pub fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Get or create the lock for a root id
    pub fn get_lock(&self, root_id: &str) -> Arc<RwLock<()>> {
        {
            let map = self.locks.read();
            if let Some(lock) = map.get(root_id) {
                return lock.clone();
            }
        }

        // another thread may have inserted it in between
        let mut map = self.locks.write();
        map.entry(root_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Locks for several roots, deduplicated and in a stable order.
    ///
    /// Acquire guards in the returned order to avoid lock-order inversions.
    pub fn get_locks<'a>(&self, root_ids: impl IntoIterator<Item = &'a str>) -> Vec<Arc<RwLock<()>>> {
        let mut ids: Vec<&str> = root_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(|id| self.get_lock(id)).collect()
    }

    /// Drop locks nobody else holds a handle to
    pub fn prune(&self) -> usize {
        let mut map = self.locks.write();
        let before = map.len();
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.locks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.read().is_empty()
    }
}

impl Default for SubtreeLockManager {
    fn default() -> Self {
        Self::new()
    }
}
