//! In-memory item store with a maintained parent index.

use crate::error::StorageError;
use crate::store::{Item, ItemStore};
use crate::types::ItemId;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

#[derive(Default)]
struct Inner {
    items: HashMap<ItemId, Item>,
    children: HashMap<ItemId, BTreeSet<ItemId>>,
}

impl Inner {
    fn unlink(&mut self, item: &Item) {
        if let Some(parent_id) = &item.parent_event_id {
            if let Some(siblings) = self.children.get_mut(parent_id) {
                siblings.remove(&item.id);
                if siblings.is_empty() {
                    self.children.remove(parent_id);
                }
            }
        }
    }
}

/// Item store kept entirely in memory
#[derive(Default)]
pub struct MemoryItemStore {
    inner: RwLock<Inner>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list of items
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        let store = Self::new();
        for item in items {
            store.upsert(item);
        }
        store
    }

    /// Insert or replace an item, returning the previous version
    pub fn upsert(&self, item: Item) -> Option<Item> {
        let mut inner = self.inner.write();
        let previous = inner.items.remove(&item.id);
        if let Some(previous) = &previous {
            inner.unlink(previous);
        }
        if let Some(parent_id) = &item.parent_event_id {
            inner
                .children
                .entry(parent_id.clone())
                .or_default()
                .insert(item.id.clone());
        }
        inner.items.insert(item.id.clone(), item);
        previous
    }

    /// Change an item's parent in place
    pub fn set_parent(&self, id: &str, parent_id: Option<&str>) -> Option<Item> {
        let mut item = self.inner.read().items.get(id).cloned()?;
        item.parent_event_id = parent_id.map(str::to_string);
        self.upsert(item.clone());
        Some(item)
    }

    /// Remove an item. Children keep their (now dangling) parent pointer.
    pub fn remove(&self, id: &str) -> Option<Item> {
        let mut inner = self.inner.write();
        let removed = inner.items.remove(id)?;
        inner.unlink(&removed);
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }
}

impl ItemStore for MemoryItemStore {
    fn get(&self, id: &str) -> Result<Option<Item>, StorageError> {
        Ok(self.inner.read().items.get(id).cloned())
    }

    fn get_by_parent(&self, parent_id: &str) -> Result<Vec<Item>, StorageError> {
        let inner = self.inner.read();
        Ok(inner
            .children
            .get(parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.items.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_all(&self) -> Result<Vec<Item>, StorageError> {
        Ok(self.inner.read().items.values().cloned().collect())
    }
}
