//! Materialized Tree Views
//!
//! Immutable, ready-to-render snapshots of a scoped item set: nodes in
//! depth-first order with depth and ordered children. Snapshots are produced
//! by the pure builder in [`build`] and memoized per scope by [`cache`].

pub mod build;
pub mod cache;
pub mod hasher;
pub mod incremental;

use crate::store::Item;
use crate::types::ItemId;
use std::collections::HashMap;
use std::time::Duration;

pub use build::build_tree;
pub use cache::{CacheStats, TreeViewCache};
pub use hasher::compute_events_hash;

/// A single node of a materialized tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub item: Item,
    /// 0 for top-level items
    pub depth: usize,
    /// Position in depth-first order
    pub order: usize,
    /// Direct in-scope children, sibling-ordered
    pub children: Vec<ItemId>,
}

impl TreeNode {
    pub fn id(&self) -> &str {
        &self.item.id
    }
}

/// Structural problem found while building
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeValidationError {
    /// Parent chain loops back; `cycle` lists the loop, first id repeated last
    Cycle { item_id: ItemId, cycle: Vec<ItemId> },
    /// Parent is not part of the scoped item set
    Orphan { item_id: ItemId, parent_id: ItemId },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub max_depth: usize,
    pub build_duration: Duration,
}

/// Immutable tree snapshot
///
/// Items trapped in a parent cycle (and anything below them) are not part of
/// `nodes`; they are reported through `errors`.
#[derive(Debug, Clone)]
pub struct MaterializedTree {
    nodes: Vec<TreeNode>,
    positions: HashMap<ItemId, usize>,
    root_ids: Vec<ItemId>,
    errors: Vec<TreeValidationError>,
    stats: TreeStats,
}

impl MaterializedTree {
    pub(crate) fn assemble(
        nodes: Vec<TreeNode>,
        root_ids: Vec<ItemId>,
        errors: Vec<TreeValidationError>,
        build_duration: Duration,
    ) -> Self {
        let positions = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.item.id.clone(), i))
            .collect();
        let stats = TreeStats {
            total_nodes: nodes.len(),
            max_depth: nodes.iter().map(|n| n.depth).max().unwrap_or(0),
            build_duration,
        };
        Self {
            nodes,
            positions,
            root_ids,
            errors,
            stats,
        }
    }

    /// Nodes in depth-first order
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.positions.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn depth(&self, id: &str) -> Option<usize> {
        self.get(id).map(|n| n.depth)
    }

    pub fn children_of(&self, id: &str) -> &[ItemId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Top-level ids in sibling order
    pub fn root_ids(&self) -> &[ItemId] {
        &self.root_ids
    }

    pub fn errors(&self) -> &[TreeValidationError] {
        &self.errors
    }

    pub fn stats(&self) -> TreeStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Index range of the subtree under a top-level item
    pub(crate) fn top_level_span(&self, root_id: &str) -> Option<std::ops::Range<usize>> {
        let start = *self.positions.get(root_id)?;
        if self.nodes[start].depth != 0 {
            return None;
        }
        let end = self.nodes[start + 1..]
            .iter()
            .position(|n| n.depth == 0)
            .map(|offset| start + 1 + offset)
            .unwrap_or(self.nodes.len());
        Some(start..end)
    }
}

/// Equality ignores build duration
impl PartialEq for MaterializedTree {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
            && self.root_ids == other.root_ids
            && self.errors == other.errors
            && self.stats.total_nodes == other.stats.total_nodes
            && self.stats.max_depth == other.stats.max_depth
    }
}
