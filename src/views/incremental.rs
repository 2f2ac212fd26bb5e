//! Incremental rebuild
//!
//! Rebuilds only the top-level subtrees touched by a set of changed items and
//! splices them between unchanged subtrees copied from the previous snapshot.
//! Whenever the result could differ from a full build the splice is refused
//! and the caller falls back to [`super::build_tree`].

use super::build::Forest;
use super::{MaterializedTree, TreeValidationError};
use crate::store::Item;
use crate::types::ItemId;
use std::collections::HashSet;
use std::time::Instant;

/// Why a splice was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// An item outside the changed set differs from the previous snapshot
    ItemSetDrift { item_id: ItemId },
    /// Previous or new item set contains a parent cycle
    Cycle,
    /// Locating an affected top-level ancestor took too many hops
    WalkBound { item_id: ItemId },
    /// Too many affected subtrees for a splice to pay off
    OverThreshold { affected: usize, limit: usize },
}

#[derive(Debug)]
pub struct SpliceOutcome {
    pub tree: MaterializedTree,
    pub affected_roots: usize,
    pub reused_nodes: usize,
}

/// Largest affected-subtree count for which a splice is attempted
pub fn splice_limit(total_nodes: usize, threshold: f64) -> usize {
    (total_nodes as f64 * threshold).ceil() as usize
}

/// Splice `items` (already scope-filtered) onto `previous`
pub fn splice(
    previous: &MaterializedTree,
    items: Vec<Item>,
    changed: &HashSet<ItemId>,
    threshold: f64,
    max_walk: usize,
) -> Result<SpliceOutcome, Fallback> {
    let started = Instant::now();
    let has_cycle = |errors: &[TreeValidationError]| {
        errors
            .iter()
            .any(|e| matches!(e, TreeValidationError::Cycle { .. }))
    };
    if has_cycle(previous.errors()) {
        return Err(Fallback::Cycle);
    }

    let forest = Forest::new(items);
    for (id, item) in &forest.by_id {
        if changed.contains(id) {
            continue;
        }
        if previous.get(id).map(|node| &node.item) != Some(item) {
            return Err(Fallback::ItemSetDrift {
                item_id: id.clone(),
            });
        }
    }
    if let Some(node) = previous
        .nodes()
        .iter()
        .find(|node| !changed.contains(&node.item.id) && !forest.by_id.contains_key(&node.item.id))
    {
        return Err(Fallback::ItemSetDrift {
            item_id: node.item.id.clone(),
        });
    }

    let errors = forest.validate();
    if has_cycle(&errors) {
        return Err(Fallback::Cycle);
    }

    let mut affected: HashSet<ItemId> = HashSet::new();
    for id in changed {
        if forest.by_id.contains_key(id) {
            let root = walk_to_top(id, max_walk, |at| forest.parent_in_scope(at))?;
            affected.insert(root);
        }
        if previous.contains(id) {
            let root = walk_to_top(id, max_walk, |at| {
                previous
                    .get(at)?
                    .item
                    .parent_event_id
                    .as_deref()
                    .filter(|parent_id| previous.contains(parent_id))
            })?;
            affected.insert(root);
        }
    }

    let limit = splice_limit(previous.len(), threshold);
    if affected.len() > limit {
        return Err(Fallback::OverThreshold {
            affected: affected.len(),
            limit,
        });
    }

    let mut nodes = Vec::with_capacity(forest.len());
    let mut visited = HashSet::new();
    let mut reused_nodes = 0;
    for root_id in &forest.root_ids {
        let span = if affected.contains(root_id) {
            None
        } else {
            previous.top_level_span(root_id)
        };
        match span {
            Some(span) => {
                reused_nodes += span.len();
                for node in &previous.nodes()[span] {
                    let mut node = node.clone();
                    node.order = nodes.len();
                    nodes.push(node);
                }
            }
            None => forest.append_subtree(root_id, &mut nodes, &mut visited),
        }
    }

    let affected_roots = affected.len();
    let tree = MaterializedTree::assemble(nodes, forest.root_ids, errors, started.elapsed());
    Ok(SpliceOutcome {
        tree,
        affected_roots,
        reused_nodes,
    })
}

fn walk_to_top<'a, F>(id: &'a str, max_walk: usize, parent_of: F) -> Result<ItemId, Fallback>
where
    F: Fn(&'a str) -> Option<&'a str>,
{
    let mut current = id;
    for _ in 0..max_walk {
        match parent_of(current) {
            Some(parent_id) => current = parent_id,
            None => return Ok(current.to_string()),
        }
    }
    Err(Fallback::WalkBound {
        item_id: id.to_string(),
    })
}
