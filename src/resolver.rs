//! Root Resolver
//!
//! Answers "which root does this item belong to" from the tree index, walking
//! parent links through the item store only when no cached root exists. Walk
//! results are written back (path compression) so repeat lookups stay O(1).

use crate::concurrency::SubtreeLockManager;
use crate::config::ResolverConfig;
use crate::error::{ApiError, StorageError};
use crate::index::{TreeIndex, TreeIndexEntry};
use crate::perf::{ops, Metadata, PerfMonitor};
use crate::store::{Item, ItemStore};
use crate::types::ItemId;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Tree context of a single item, assembled from index-backed queries
#[derive(Debug, Clone, PartialEq)]
pub struct TreeContext {
    pub id: ItemId,
    pub root_id: ItemId,
    /// `None` when the root item no longer exists in the item store
    pub root_item: Option<Item>,
    /// Indexed descendants of `id`, excluding `id` itself.
    ///
    /// Equals `tree_size` when `id` is the root. For any other item it is a
    /// breadth-first walk of the parent index, O(size of the subtree).
    pub subtree_count: usize,
    pub direct_child_count: usize,
    /// Entries whose cached root is `root_id`, excluding the root itself
    pub tree_size: usize,
}

/// Outcome of an upward walk
struct Walk {
    root: ItemId,
    /// (id, parent) for every item visited, queried id first
    path: Vec<(ItemId, Option<ItemId>)>,
    hops: usize,
    /// Indexed ancestor whose cached root ended the walk, with that root
    anchor: Option<(ItemId, ItemId)>,
}

/// Walks redone because another writer changed the index underneath
const MAX_WALK_ATTEMPTS: usize = 8;

/// Root resolver
pub struct RootResolver {
    items: Arc<dyn ItemStore>,
    index: Arc<dyn TreeIndex>,
    locks: Arc<SubtreeLockManager>,
    perf: Arc<PerfMonitor>,
    config: ResolverConfig,
}

impl RootResolver {
    pub fn new(
        items: Arc<dyn ItemStore>,
        index: Arc<dyn TreeIndex>,
        locks: Arc<SubtreeLockManager>,
        perf: Arc<PerfMonitor>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            items,
            index,
            locks,
            perf,
            config,
        }
    }

    /// Resolve the root of `id`.
    ///
    /// Cycles, runaway chains and missing parents never fail the call: the
    /// last reachable item is treated as its own root. Storage failures are
    /// returned as-is.
    ///
    /// The walk itself runs without locks. Its write-back happens under the
    /// writer gate and only if no index entry it read or would overwrite has
    /// been resolved by another writer since; otherwise the walk is redone.
    pub fn resolve_root(&self, id: &str) -> Result<ItemId, ApiError> {
        if let Some(root) = self.cached_root(id)? {
            return Ok(root);
        }

        let started = Instant::now();
        let mut attempt = 1;
        let (walk, written) = loop {
            let walk = self.walk(id)?;

            let _writer = self.locks.writer();
            let lock = self.locks.get_lock(&walk.root);
            let _guard = lock.read();
            // A concurrent resolution may have written the entry meanwhile
            if let Some(root) = self.cached_root(id)? {
                return Ok(root);
            }
            if self.walk_is_current(&walk)? {
                let entries = self.path_entries(&walk);
                self.index.bulk_put(&entries)?;
                break (walk, entries.len());
            }
            if attempt >= MAX_WALK_ATTEMPTS {
                warn!(
                    item_id = id,
                    root_id = %walk.root,
                    attempts = attempt,
                    "Index kept changing under the walk, returning root without caching it"
                );
                break (walk, 0);
            }
            debug!(item_id = id, attempt, "Index changed during walk, walking again");
            attempt += 1;
        };

        debug!(
            item_id = id,
            root_id = %walk.root,
            hops = walk.hops,
            written,
            "Resolved root by walking parents"
        );
        let mut metadata = Metadata::new();
        metadata.insert("hops".to_string(), walk.hops.into());
        self.perf.record(ops::RESOLVE_ROOT, started.elapsed(), metadata);

        Ok(walk.root)
    }

    /// Ensure an index entry exists for `id`, resolving its root if needed
    pub fn register(&self, id: &str) -> Result<TreeIndexEntry, ApiError> {
        let root = self.resolve_root(id)?;
        if let Some(entry) = self.index.get(id)? {
            return Ok(entry);
        }

        // write-back was skipped after repeated contention
        let _writer = self.locks.writer();
        if let Some(entry) = self.index.get(id)? {
            return Ok(entry);
        }
        let parent = self
            .items
            .get(id)?
            .and_then(|item| item.parent_event_id);
        let entry = TreeIndexEntry::resolved(id, parent, root);
        self.index.put(&entry)?;
        Ok(entry)
    }

    /// Root, root item and counts for `id`, using only index-backed queries
    pub fn tree_context(&self, id: &str) -> Result<TreeContext, ApiError> {
        let started = Instant::now();
        let root_id = self.resolve_root(id)?;

        let lock = self.locks.get_lock(&root_id);
        let _guard = lock.read();

        let direct_child_count = self.index.count_children_of(id)?;
        let tree_size = self.index.count_subtree_of(&root_id)?;
        let subtree_count = if root_id == id {
            tree_size
        } else {
            self.count_descendants(id)?
        };
        let root_item = self.items.get(&root_id)?;

        self.perf
            .record(ops::TREE_CONTEXT, started.elapsed(), Metadata::new());

        Ok(TreeContext {
            id: id.to_string(),
            root_id,
            root_item,
            subtree_count,
            direct_child_count,
            tree_size,
        })
    }

    fn cached_root(&self, id: &str) -> Result<Option<ItemId>, StorageError> {
        Ok(self.index.get(id)?.and_then(|entry| entry.root_event_id))
    }

    /// Entries the walk writes back.
    ///
    /// The queried item always gets its root. Without path compression the
    /// other visited items are still indexed with their parent link so that
    /// propagation can reach everything below them, but their root is left
    /// unresolved (the root item itself is always resolved).
    fn path_entries(&self, walk: &Walk) -> Vec<TreeIndexEntry> {
        walk.path
            .iter()
            .enumerate()
            .map(|(position, (item_id, parent))| {
                if position == 0 || self.config.compress_path || *item_id == walk.root {
                    TreeIndexEntry::resolved(item_id.clone(), parent.clone(), walk.root.clone())
                } else {
                    TreeIndexEntry::unresolved(item_id.clone(), parent.clone())
                }
            })
            .collect()
    }

    /// True while nothing the walk relied on has been resolved or moved by
    /// another writer. Must be called under the writer gate.
    fn walk_is_current(&self, walk: &Walk) -> Result<bool, StorageError> {
        if let Some((anchor_id, anchor_root)) = &walk.anchor {
            if self.cached_root(anchor_id)?.as_ref() != Some(anchor_root) {
                return Ok(false);
            }
        }
        for (item_id, _) in &walk.path {
            if self.cached_root(item_id)?.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn walk(&self, id: &str) -> Result<Walk, ApiError> {
        let item = self
            .items
            .get(id)?
            .ok_or_else(|| ApiError::ItemNotFound(id.to_string()))?;

        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut path = Vec::new();
        let mut current = item.id;
        let mut parent = item.parent_event_id;
        let mut hops = 0;
        let mut anchor = None;

        let root = loop {
            visited.insert(current.clone());
            path.push((current.clone(), parent.clone()));

            let Some(parent_id) = parent else {
                break current;
            };
            if visited.contains(&parent_id) {
                warn!(item_id = id, at = %current, "Cycle in parent chain, treating item as root");
                break current;
            }
            if hops >= self.config.max_hops {
                warn!(
                    item_id = id,
                    at = %current,
                    max_hops = self.config.max_hops,
                    "Parent chain exceeds hop bound, treating item as root"
                );
                break current;
            }
            hops += 1;

            if let Some(root) = self.cached_root(&parent_id)? {
                anchor = Some((parent_id, root.clone()));
                break root;
            }
            match self.items.get(&parent_id)? {
                Some(next) => {
                    current = next.id;
                    parent = next.parent_event_id;
                }
                None => {
                    debug!(item_id = %current, parent_id = %parent_id, "Parent missing, treating item as root");
                    break current;
                }
            }
        };

        Ok(Walk {
            root,
            path,
            hops,
            anchor,
        })
    }

    /// Breadth-first count over the parent index
    fn count_descendants(&self, id: &str) -> Result<usize, StorageError> {
        let mut visited: HashSet<ItemId> = HashSet::from([id.to_string()]);
        let mut queue: VecDeque<ItemId> = VecDeque::from([id.to_string()]);
        let mut count = 0;
        while let Some(parent_id) = queue.pop_front() {
            for child in self.index.children_of(&parent_id)? {
                if visited.insert(child.id.clone()) {
                    count += 1;
                    queue.push_back(child.id);
                }
            }
        }
        Ok(count)
    }
}
