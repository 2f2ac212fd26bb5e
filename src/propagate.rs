//! Reparent Propagator
//!
//! Rewrites cached roots for a moved subtree. Traversal is breadth-first over
//! the tree index's parent index only; every staged change lands in a single
//! `bulk_put`, taken under write locks on the affected roots so readers see
//! either the old or the new assignment for the whole subtree.

use crate::concurrency::SubtreeLockManager;
use crate::error::StorageError;
use crate::index::{TreeIndex, TreeIndexEntry};
use crate::perf::{ops, Metadata, PerfMonitor};
use crate::types::ItemId;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of one propagation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    pub subtree_root: ItemId,
    /// `None` when roots were cleared rather than reassigned
    pub new_root: Option<ItemId>,
    /// Descendants discovered through the parent index
    pub visited: usize,
    /// Entries written in the batch
    pub updated: usize,
}

/// Reparent propagator
pub struct ReparentPropagator {
    index: Arc<dyn TreeIndex>,
    locks: Arc<SubtreeLockManager>,
    perf: Arc<PerfMonitor>,
}

impl ReparentPropagator {
    pub fn new(
        index: Arc<dyn TreeIndex>,
        locks: Arc<SubtreeLockManager>,
        perf: Arc<PerfMonitor>,
    ) -> Self {
        Self { index, locks, perf }
    }

    /// Point every descendant of `subtree_root_id` at `new_root_id`.
    ///
    /// The subtree root's own entry is left untouched; use [`Self::reparent`]
    /// to move an item together with its descendants.
    pub fn propagate_root(
        &self,
        subtree_root_id: &str,
        new_root_id: &str,
    ) -> Result<PropagationReport, StorageError> {
        let started = Instant::now();
        let _writer = self.locks.writer();
        let old_root = self.current_root(subtree_root_id)?;
        let locks = self
            .locks
            .get_locks(old_root.iter().map(String::as_str).chain([new_root_id]));
        let _guards: Vec<_> = locks.iter().map(|lock| lock.write()).collect();

        let (mut staged, visited) = self.stage_descendants(subtree_root_id, |entry| {
            (entry.root_event_id.as_deref() != Some(new_root_id)).then(|| TreeIndexEntry {
                root_event_id: Some(new_root_id.to_string()),
                ..entry.clone()
            })
        })?;
        let updated = self.flush(&mut staged)?;

        self.finish(started, ops::PROPAGATE_ROOT, visited, updated);
        debug!(
            subtree_root = subtree_root_id,
            new_root = new_root_id,
            visited,
            updated,
            "Propagated root to subtree"
        );
        Ok(PropagationReport {
            subtree_root: subtree_root_id.to_string(),
            new_root: Some(new_root_id.to_string()),
            visited,
            updated,
        })
    }

    /// Move `id` under `new_parent` with root `new_root`.
    ///
    /// The moved item's own entry and all of its descendants are written in
    /// one batch.
    pub fn reparent(
        &self,
        id: &str,
        new_parent: Option<&str>,
        new_root: &str,
    ) -> Result<PropagationReport, StorageError> {
        let started = Instant::now();
        let _writer = self.locks.writer();
        let old_root = self.current_root(id)?;
        let locks = self
            .locks
            .get_locks(old_root.iter().map(String::as_str).chain([new_root]));
        let _guards: Vec<_> = locks.iter().map(|lock| lock.write()).collect();

        let (mut staged, visited) = self.stage_descendants(id, |entry| {
            (entry.root_event_id.as_deref() != Some(new_root)).then(|| TreeIndexEntry {
                root_event_id: Some(new_root.to_string()),
                ..entry.clone()
            })
        })?;
        staged.retain(|entry| entry.id != id);
        staged.push(TreeIndexEntry::resolved(
            id,
            new_parent.map(str::to_string),
            new_root,
        ));
        let updated = self.flush(&mut staged)?;

        self.finish(started, ops::PROPAGATE_ROOT, visited, updated);
        info!(
            item_id = id,
            old_root = ?old_root,
            new_root,
            updated,
            "Item re-parented"
        );
        Ok(PropagationReport {
            subtree_root: id.to_string(),
            new_root: Some(new_root.to_string()),
            visited,
            updated,
        })
    }

    /// Drop the entry for a deleted item and clear cached roots below it.
    ///
    /// Descendants keep their entries (and parent pointers) but are
    /// re-resolved on their next lookup.
    pub fn invalidate_subtree(&self, id: &str) -> Result<PropagationReport, StorageError> {
        let started = Instant::now();
        let _writer = self.locks.writer();
        let old_root = self.current_root(id)?;
        let locks = self.locks.get_locks(old_root.iter().map(String::as_str));
        let _guards: Vec<_> = locks.iter().map(|lock| lock.write()).collect();

        let (mut staged, visited) = self.stage_descendants(id, |entry| {
            entry.is_resolved().then(|| TreeIndexEntry {
                root_event_id: None,
                ..entry.clone()
            })
        })?;
        staged.retain(|entry| entry.id != id);
        let removed = self.index.delete(id)?;
        let updated = self.flush(&mut staged)?;

        self.finish(started, ops::INVALIDATE_SUBTREE, visited, updated);
        debug!(
            item_id = id,
            had_entry = removed.is_some(),
            cleared = updated,
            "Invalidated subtree of deleted item"
        );
        Ok(PropagationReport {
            subtree_root: id.to_string(),
            new_root: None,
            visited,
            updated,
        })
    }

    fn current_root(&self, id: &str) -> Result<Option<ItemId>, StorageError> {
        Ok(self.index.get(id)?.and_then(|entry| entry.root_event_id))
    }

    /// Breadth-first walk below `seed`; `stage` decides which entries change.
    ///
    /// Every child found through the parent index is offered to `stage`,
    /// including `seed` itself when a parent cycle leads back to it. Each id
    /// is expanded at most once, so cycles terminate.
    fn stage_descendants<F>(
        &self,
        seed: &str,
        stage: F,
    ) -> Result<(Vec<TreeIndexEntry>, usize), StorageError>
    where
        F: Fn(&TreeIndexEntry) -> Option<TreeIndexEntry>,
    {
        let mut expanded: HashSet<ItemId> = HashSet::new();
        let mut queue: VecDeque<ItemId> = VecDeque::from([seed.to_string()]);
        let mut staged = Vec::new();

        while let Some(parent_id) = queue.pop_front() {
            if !expanded.insert(parent_id.clone()) {
                continue;
            }
            for child in self.index.children_of(&parent_id)? {
                if let Some(update) = stage(&child) {
                    staged.push(update);
                }
                queue.push_back(child.id);
            }
        }

        Ok((staged, expanded.len() - 1))
    }

    fn flush(&self, staged: &mut Vec<TreeIndexEntry>) -> Result<usize, StorageError> {
        if staged.is_empty() {
            return Ok(0);
        }
        self.index.bulk_put(staged)?;
        Ok(std::mem::take(staged).len())
    }

    fn finish(&self, started: Instant, operation: &str, visited: usize, updated: usize) {
        let mut metadata = Metadata::new();
        metadata.insert("visited".to_string(), visited.into());
        metadata.insert("updated".to_string(), updated.into());
        self.perf.record(operation, started.elapsed(), metadata);
    }
}
