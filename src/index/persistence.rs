//! Sled-backed tree index
//!
//! Layout:
//! - `entries`:   id → bincode(TreeIndexEntry)
//! - `by_parent`: "{parent}\0{id}" → ()
//! - `by_root`:   "{root}\0{id}" → ()
//!
//! Children lookups and counts are prefix scans over the secondary trees.
//! Writes span all three trees inside one sled transaction.

use crate::error::StorageError;
use crate::index::{TreeIndex, TreeIndexEntry};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use sled::Transactional;
use std::path::Path;
use tracing::debug;

const ENTRIES_TREE: &str = "entries";
const BY_PARENT_TREE: &str = "by_parent";
const BY_ROOT_TREE: &str = "by_root";

fn prefix_of(key: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(key.len() + 1);
    prefix.extend_from_slice(key.as_bytes());
    prefix.push(0);
    prefix
}

fn index_key(key: &str, id: &str) -> Vec<u8> {
    let mut out = prefix_of(key);
    out.extend_from_slice(id.as_bytes());
    out
}

fn abort<E: Into<StorageError>>(err: E) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err.into())
}

fn flatten(err: TransactionError<StorageError>) -> StorageError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => StorageError::Sled(err),
    }
}

fn unlink(
    by_parent: &TransactionalTree,
    by_root: &TransactionalTree,
    entry: &TreeIndexEntry,
) -> Result<(), ConflictableTransactionError<StorageError>> {
    if let Some(parent) = &entry.parent_event_id {
        by_parent.remove(index_key(parent, &entry.id))?;
    }
    if let Some(root) = &entry.root_event_id {
        by_root.remove(index_key(root, &entry.id))?;
    }
    Ok(())
}

/// Persistent tree index stored in a sled database
pub struct SledTreeIndex {
    db: sled::Db,
    entries: sled::Tree,
    by_parent: sled::Tree,
    by_root: sled::Tree,
}

impl SledTreeIndex {
    /// Open (or create) an index at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        debug!(path = %path.display(), "Opened sled tree index");
        Self::from_db(db)
    }

    /// Open an index that is discarded when dropped
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            entries: db.open_tree(ENTRIES_TREE)?,
            by_parent: db.open_tree(BY_PARENT_TREE)?,
            by_root: db.open_tree(BY_ROOT_TREE)?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn decode(bytes: &[u8]) -> Result<TreeIndexEntry, StorageError> {
        Ok(bincode::deserialize(bytes)?)
    }

    fn ids_with_prefix(tree: &sled::Tree, key: &str) -> Result<Vec<String>, StorageError> {
        let prefix = prefix_of(key);
        let mut ids = Vec::new();
        for kv in tree.scan_prefix(&prefix) {
            let (k, _) = kv?;
            let id = String::from_utf8(k[prefix.len()..].to_vec())
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

impl TreeIndex for SledTreeIndex {
    fn get(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError> {
        match self.entries.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, entry: &TreeIndexEntry) -> Result<(), StorageError> {
        self.bulk_put(std::slice::from_ref(entry))
    }

    fn bulk_put(&self, batch: &[TreeIndexEntry]) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        (&self.entries, &self.by_parent, &self.by_root)
            .transaction(|(entries, by_parent, by_root)| {
                for entry in batch {
                    if let Some(bytes) = entries.get(entry.id.as_bytes())? {
                        let previous = Self::decode(&bytes).map_err(abort)?;
                        unlink(by_parent, by_root, &previous)?;
                    }
                    let encoded = bincode::serialize(entry).map_err(abort)?;
                    entries.insert(entry.id.as_bytes(), encoded)?;
                    if let Some(parent) = &entry.parent_event_id {
                        by_parent.insert(index_key(parent, &entry.id), Vec::<u8>::new())?;
                    }
                    if let Some(root) = &entry.root_event_id {
                        by_root.insert(index_key(root, &entry.id), Vec::<u8>::new())?;
                    }
                }
                Ok::<(), ConflictableTransactionError<StorageError>>(())
            })
            .map_err(flatten)
    }

    fn delete(&self, id: &str) -> Result<Option<TreeIndexEntry>, StorageError> {
        (&self.entries, &self.by_parent, &self.by_root)
            .transaction(|(entries, by_parent, by_root)| {
                let Some(bytes) = entries.remove(id.as_bytes())? else {
                    return Ok(None);
                };
                let previous = Self::decode(&bytes).map_err(abort)?;
                unlink(by_parent, by_root, &previous)?;
                Ok::<_, ConflictableTransactionError<StorageError>>(Some(previous))
            })
            .map_err(flatten)
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<TreeIndexEntry>, StorageError> {
        let mut children = Vec::new();
        for id in Self::ids_with_prefix(&self.by_parent, parent_id)? {
            if let Some(entry) = self.get(&id)? {
                children.push(entry);
            }
        }
        Ok(children)
    }

    fn count_children_of(&self, parent_id: &str) -> Result<usize, StorageError> {
        let mut count = 0;
        for kv in self.by_parent.scan_prefix(prefix_of(parent_id)) {
            kv?;
            count += 1;
        }
        Ok(count)
    }

    fn count_subtree_of(&self, root_id: &str) -> Result<usize, StorageError> {
        let own_key = index_key(root_id, root_id);
        let mut count = 0;
        for kv in self.by_root.scan_prefix(prefix_of(root_id)) {
            let (k, _) = kv?;
            if &k[..] != own_key.as_slice() {
                count += 1;
            }
        }
        Ok(count)
    }
}
