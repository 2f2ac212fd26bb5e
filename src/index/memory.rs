//! In-memory tree index with parent and root secondary indexes.

use crate::error::StorageError;
use crate::index::{TreeIndex, TreeIndexEntry};
use crate::types::ItemId;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
struct Inner {
    entries: HashMap<ItemId, TreeIndexEntry>,
    by_parent: HashMap<ItemId, BTreeSet<ItemId>>,
    by_root: HashMap<ItemId, BTreeSet<ItemId>>,
}

fn unlink(index: &mut HashMap<ItemId, BTreeSet<ItemId>>, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}

impl Inner {
    fn remove(&mut self, id: &str) -> Option<TreeIndexEntry> {
        let previous = self.entries.remove(id)?;
        if let Some(parent) = &previous.parent_event_id {
            unlink(&mut self.by_parent, parent, id);
        }
        if let Some(root) = &previous.root_event_id {
            unlink(&mut self.by_root, root, id);
        }
        Some(previous)
    }

    fn apply(&mut self, entry: &TreeIndexEntry) {
        self.remove(&entry.id);
        if let Some(parent) = &entry.parent_event_id {
            self.by_parent
                .entry(parent.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        if let Some(root) = &entry.root_event_id {
            self.by_root
                .entry(root.clone())
                .or_default()
                .insert(entry.id.clone());
        }
        self.entries.insert(entry.id.clone(), entry.clone());
    }
}

/// Tree index held in process memory
///
/// A single write lock covers each `bulk_put`, so readers observe a batch
/// either entirely or not at all.
#[derive(Default)]
pub struct MemoryTreeIndex {
    inner: RwLock<Inner>,
}

impl MemoryTreeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

impl TreeIndex for MemoryTreeIndex {
    fn get(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError> {
        Ok(self.inner.read().entries.get(id).cloned())
    }

    fn put(&self, entry: &TreeIndexEntry) -> Result<(), StorageError> {
        self.inner.write().apply(entry);
        Ok(())
    }

    fn bulk_put(&self, entries: &[TreeIndexEntry]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        for entry in entries {
            inner.apply(entry);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError> {
        Ok(self.inner.write().remove(id))
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<TreeIndexEntry>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .by_parent
            .get(parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn count_children_of(&self, parent_id: &str) -> Result<usize, StorageError> {
        Ok(self
            .inner
            .read()
            .by_parent
            .get(parent_id)
            .map(BTreeSet::len)
            .unwrap_or(0))
    }

    fn count_subtree_of(&self, root_id: &str) -> Result<usize, StorageError> {
        Ok(self
            .inner
            .read()
            .by_root
            .get(root_id)
            .map(|ids| ids.len() - usize::from(ids.contains(root_id)))
            .unwrap_or(0))
    }
}
