//! Property tests: every resolved root is reachable by walking parents

use evtree::config::EngineConfig;
use evtree::index::MemoryTreeIndex;
use evtree::store::{Item, ItemStore, MemoryItemStore};
use evtree::EventTreeEngine;
use proptest::prelude::*;
use std::sync::Arc;

const MAX_HOPS: usize = 200;

/// Items `n0..nN`; `parents[i]` picks a parent slot, slots past the item
/// count become dangling references
fn build_items(parents: &[Option<usize>], acyclic: bool) -> Vec<Item> {
    let n = parents.len();
    parents
        .iter()
        .enumerate()
        .map(|(i, slot)| {
            let item = Item::new(format!("n{}", i));
            let parent = match slot {
                None => None,
                Some(_) if acyclic && i == 0 => None,
                Some(j) if acyclic => Some(format!("n{}", j % i)),
                Some(j) => {
                    let j = j % (n + 3);
                    if j < n {
                        Some(format!("n{}", j))
                    } else {
                        Some(format!("missing-{}", j))
                    }
                }
            };
            match parent {
                Some(p) => item.with_parent(p),
                None => item,
            }
        })
        .collect()
}

fn reaches(store: &MemoryItemStore, id: &str, root: &str) -> bool {
    let mut current = id.to_string();
    for _ in 0..=MAX_HOPS {
        if current == root {
            return true;
        }
        match store.get(&current).unwrap().and_then(|i| i.parent_event_id) {
            Some(parent) if store.get(&parent).unwrap().is_some() => current = parent,
            _ => return false,
        }
    }
    false
}

fn engine_over(store: Arc<MemoryItemStore>) -> EventTreeEngine {
    EventTreeEngine::new(EngineConfig::default(), store, Arc::new(MemoryTreeIndex::new())).unwrap()
}

proptest! {
    #[test]
    fn resolved_root_is_reachable_in_forests(parents in prop::collection::vec(prop::option::of(0usize..64), 1..40)) {
        let store = Arc::new(MemoryItemStore::from_items(build_items(&parents, true)));
        let engine = engine_over(store.clone());

        for i in (0..parents.len()).rev() {
            let id = format!("n{}", i);
            let root = engine.resolve_root(&id).unwrap();
            prop_assert!(reaches(&store, &id, &root), "{} does not reach {}", id, root);

            let top = store.get(&root).unwrap().unwrap();
            prop_assert!(top.parent_event_id.is_none());
            prop_assert_eq!(engine.resolve_root(&id).unwrap(), root);
        }
    }

    #[test]
    fn resolution_terminates_with_cycles_and_dangling_parents(parents in prop::collection::vec(prop::option::of(0usize..64), 1..40)) {
        let store = Arc::new(MemoryItemStore::from_items(build_items(&parents, false)));
        let engine = engine_over(store.clone());

        for i in 0..parents.len() {
            let id = format!("n{}", i);
            let root = engine.resolve_root(&id).unwrap();
            prop_assert!(reaches(&store, &id, &root), "{} does not reach {}", id, root);
        }
    }

    #[test]
    fn subtree_counts_match_tree_view(parents in prop::collection::vec(prop::option::of(0usize..64), 1..30)) {
        let items = build_items(&parents, true);
        let store = Arc::new(MemoryItemStore::from_items(items.clone()));
        let engine = engine_over(store);
        for item in &items {
            engine.item_created(&item.id).unwrap();
        }

        let tree = evtree::views::build_tree(&items, &evtree::store::AllItems);
        for root_id in tree.root_ids() {
            let ctx = engine.tree_context(root_id).unwrap();
            let span = tree
                .nodes()
                .iter()
                .skip_while(|n| n.id() != root_id.as_str())
                .skip(1)
                .take_while(|n| n.depth > 0)
                .count();
            prop_assert_eq!(ctx.subtree_count, span);
            prop_assert_eq!(ctx.direct_child_count, tree.children_of(root_id).len());
        }
    }
}
