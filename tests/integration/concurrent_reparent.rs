//! Readers racing a subtree move see either the old or the new root

use evtree::config::EngineConfig;
use evtree::index::{MemoryTreeIndex, SledTreeIndex, TreeIndex};
use evtree::store::{Item, MemoryItemStore};
use evtree::EventTreeEngine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

const DEPTH: usize = 50;

fn chain_store() -> Arc<MemoryItemStore> {
    let mut items = vec![Item::new("left"), Item::new("right"), Item::new("move-0").with_parent("left")];
    for i in 1..DEPTH {
        items.push(Item::new(format!("move-{}", i)).with_parent(format!("move-{}", i - 1)));
    }
    Arc::new(MemoryItemStore::from_items(items))
}

fn race(index: Arc<dyn TreeIndex>) {
    let store = chain_store();
    let engine = Arc::new(EventTreeEngine::new(EngineConfig::default(), store.clone(), index).unwrap());
    engine.item_created(&format!("move-{}", DEPTH - 1)).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|r| {
            let engine = engine.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut observed = 0usize;
                while !done.load(Ordering::SeqCst) {
                    let id = format!("move-{}", (observed * 7 + r) % DEPTH);
                    let root = engine.resolve_root(&id).unwrap();
                    assert!(root == "left" || root == "right", "unexpected root {}", root);
                    observed += 1;
                }
                observed
            })
        })
        .collect();

    for round in 0..20 {
        let target = if round % 2 == 0 { "right" } else { "left" };
        store.set_parent("move-0", Some(target));
        let report = engine.item_reparented("move-0").unwrap();
        assert_eq!(report.updated, DEPTH);
        assert_eq!(engine.resolve_root(&format!("move-{}", DEPTH - 1)).unwrap(), target);
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }
}

#[test]
fn memory_index_moves_are_atomic_for_readers() {
    race(Arc::new(MemoryTreeIndex::new()));
}

#[test]
fn sled_index_moves_are_atomic_for_readers() {
    race(Arc::new(SledTreeIndex::temporary().unwrap()));
}

#[test]
fn subtree_lock_table_can_be_pruned() {
    let store = chain_store();
    let engine = EventTreeEngine::new(EngineConfig::default(), store.clone(), Arc::new(MemoryTreeIndex::new())).unwrap();
    engine.item_created("move-3").unwrap();
    store.set_parent("move-0", Some("right"));
    engine.item_reparented("move-0").unwrap();

    assert!(engine.prune_locks() > 0);
    assert_eq!(engine.prune_locks(), 0);
}
