//! Pure tree builder
//!
//! Turns a flat item list into a [`MaterializedTree`]. No I/O, no shared
//! state: identical input always yields an identical tree.

use super::{MaterializedTree, TreeNode, TreeValidationError};
use crate::store::{Item, ScopeFilter};
use crate::types::ItemId;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Sibling order: explicit position first, then creation time, then id
pub fn compare_siblings(a: &Item, b: &Item) -> Ordering {
    let by_position = match (a.position, b.position) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let by_created = match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_position
        .then(by_created)
        .then_with(|| a.id.cmp(&b.id))
}

/// Build a tree from every in-scope item
pub fn build_tree(items: &[Item], scope: &dyn ScopeFilter) -> MaterializedTree {
    let started = Instant::now();
    let forest = Forest::new(items.iter().filter(|item| scope.is_in_scope(item)).cloned());
    let mut nodes = Vec::with_capacity(forest.len());
    let mut visited = HashSet::new();
    for root_id in &forest.root_ids {
        forest.append_subtree(root_id, &mut nodes, &mut visited);
    }
    let errors = forest.validate();
    MaterializedTree::assemble(nodes, forest.root_ids, errors, started.elapsed())
}

/// Scoped items with parent → children links resolved
pub(crate) struct Forest {
    pub(crate) by_id: HashMap<ItemId, Item>,
    children: HashMap<ItemId, Vec<ItemId>>,
    pub(crate) root_ids: Vec<ItemId>,
}

impl Forest {
    /// Later duplicates of an id replace earlier ones
    pub(crate) fn new(items: impl IntoIterator<Item = Item>) -> Self {
        let by_id: HashMap<ItemId, Item> = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        let mut children: HashMap<ItemId, Vec<ItemId>> = HashMap::new();
        let mut root_ids = Vec::new();
        for item in by_id.values() {
            match item.parent_event_id.as_deref() {
                Some(parent_id) if by_id.contains_key(parent_id) => children
                    .entry(parent_id.to_string())
                    .or_default()
                    .push(item.id.clone()),
                _ => root_ids.push(item.id.clone()),
            }
        }

        let order = |a: &ItemId, b: &ItemId| match (by_id.get(a), by_id.get(b)) {
            (Some(x), Some(y)) => compare_siblings(x, y),
            _ => a.cmp(b),
        };
        root_ids.sort_by(order);
        for siblings in children.values_mut() {
            siblings.sort_by(order);
        }

        Self {
            by_id,
            children,
            root_ids,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.by_id.len()
    }

    pub(crate) fn parent_in_scope(&self, id: &str) -> Option<&str> {
        self.by_id
            .get(id)?
            .parent_event_id
            .as_deref()
            .filter(|parent_id| self.by_id.contains_key(*parent_id))
    }

    /// Depth-first append of `root_id` and its descendants at depth 0
    pub(crate) fn append_subtree(
        &self,
        root_id: &str,
        nodes: &mut Vec<TreeNode>,
        visited: &mut HashSet<ItemId>,
    ) {
        let mut stack: Vec<(&str, usize)> = vec![(root_id, 0)];
        while let Some((id, depth)) = stack.pop() {
            let Some(item) = self.by_id.get(id) else {
                continue;
            };
            if !visited.insert(item.id.clone()) {
                continue;
            }
            let children = self.children.get(id).map(Vec::as_slice).unwrap_or(&[]);
            // Reverse so the first sibling is popped first
            for child in children.iter().rev() {
                stack.push((child.as_str(), depth + 1));
            }
            nodes.push(TreeNode {
                item: item.clone(),
                depth,
                order: nodes.len(),
                children: children.to_vec(),
            });
        }
    }

    /// Cycle and orphan checks, in a deterministic order
    pub(crate) fn validate(&self) -> Vec<TreeValidationError> {
        let mut ids: Vec<&ItemId> = self.by_id.keys().collect();
        ids.sort();

        let mut errors = Vec::new();
        let mut done: HashSet<&str> = HashSet::new();
        for &start in &ids {
            if done.contains(start.as_str()) {
                continue;
            }
            let mut path: Vec<&str> = Vec::new();
            let mut on_path: HashMap<&str, usize> = HashMap::new();
            let mut current = Some(start.as_str());
            while let Some(id) = current {
                if done.contains(id) {
                    break;
                }
                if let Some(&at) = on_path.get(id) {
                    let mut cycle: Vec<ItemId> =
                        path[at..].iter().map(|s| s.to_string()).collect();
                    cycle.push(id.to_string());
                    errors.push(TreeValidationError::Cycle {
                        item_id: id.to_string(),
                        cycle,
                    });
                    break;
                }
                on_path.insert(id, path.len());
                path.push(id);
                current = self.parent_in_scope(id);
            }
            done.extend(path);
        }

        for id in ids {
            if let Some(parent_id) = self.by_id.get(id).and_then(|i| i.parent_event_id.as_ref()) {
                if !self.by_id.contains_key(parent_id) {
                    errors.push(TreeValidationError::Orphan {
                        item_id: id.clone(),
                        parent_id: parent_id.clone(),
                    });
                }
            }
        }
        errors
    }
}
