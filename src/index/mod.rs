//! Tree Index
//!
//! Derived, rebuildable table with one entry per resolved item recording its
//! parent and its topmost ancestor ("root"). Every query goes through a
//! secondary index on `parent_event_id` or `root_event_id`; no operation scans
//! the full entry set.

pub mod memory;
pub mod persistence;

use crate::error::StorageError;
use crate::types::ItemId;
use serde::{Deserialize, Serialize};

pub use self::memory::MemoryTreeIndex;
pub use self::persistence::SledTreeIndex;

/// TreeIndexEntry: cached parent and root of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeIndexEntry {
    pub id: ItemId,
    /// Mirrors the item's parent; may lag briefly behind a move
    pub parent_event_id: Option<ItemId>,
    /// Topmost ancestor, `None` when the cached root has been invalidated
    pub root_event_id: Option<ItemId>,
}

impl TreeIndexEntry {
    /// Entry with a known root
    pub fn resolved(id: impl Into<ItemId>, parent: Option<ItemId>, root: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            parent_event_id: parent,
            root_event_id: Some(root.into()),
        }
    }

    /// Entry whose root must be recomputed on next resolution
    pub fn unresolved(id: impl Into<ItemId>, parent: Option<ItemId>) -> Self {
        Self {
            id: id.into(),
            parent_event_id: parent,
            root_event_id: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.root_event_id.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.root_event_id.as_deref() == Some(self.id.as_str())
    }
}

/// Tree index storage interface
///
/// `put` and `bulk_put` are idempotent upserts. `bulk_put` must be applied
/// atomically with respect to concurrent readers.
pub trait TreeIndex: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError>;
    fn put(&self, entry: &TreeIndexEntry) -> Result<(), StorageError>;
    fn bulk_put(&self, entries: &[TreeIndexEntry]) -> Result<(), StorageError>;
    fn delete(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError>;
    /// All entries whose `parent_event_id == parent_id`, ordered by id.
    fn children_of(&self, parent_id: &str) -> Result<Vec<TreeIndexEntry>, StorageError>;
    fn count_children_of(&self, parent_id: &str) -> Result<usize, StorageError>;
    /// Number of entries under `root_id`, not counting the root's own entry.
    fn count_subtree_of(&self, root_id: &str) -> Result<usize, StorageError>;
}
