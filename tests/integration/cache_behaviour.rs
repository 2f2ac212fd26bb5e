//! Tree view cache and performance instrumentation through the engine

use evtree::config::{EngineConfig, PerfThresholds};
use evtree::index::MemoryTreeIndex;
use evtree::perf::ops;
use evtree::store::{AllItems, Item, MemoryItemStore};
use evtree::EventTreeEngine;
use std::sync::Arc;

fn engine_with(items: Vec<Item>) -> (EventTreeEngine, Arc<MemoryItemStore>) {
    let store = Arc::new(MemoryItemStore::from_items(items));
    let engine = EventTreeEngine::new(
        EngineConfig::default(),
        store.clone(),
        Arc::new(MemoryTreeIndex::new()),
    )
    .unwrap();
    (engine, store)
}

#[test]
fn scopes_are_cached_independently() {
    let (engine, _) = engine_with(vec![
        Item::new("work"),
        Item::new("work-1").with_parent("work"),
        Item::new("home"),
    ]);
    let work_only = |item: &Item| item.id.starts_with("work");

    let all = engine.get_tree("all", &AllItems).unwrap();
    let work = engine.get_tree("work", &work_only).unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(work.len(), 2);

    let again = engine.get_tree("work", &work_only).unwrap();
    assert!(Arc::ptr_eq(&work, &again));
    assert_eq!(engine.cache().hit_count("work"), Some(1));
    assert_eq!(engine.cache().hit_count("all"), Some(0));
}

#[test]
fn item_edit_is_picked_up_on_next_query() {
    let (engine, store) = engine_with(vec![Item::new("a"), Item::new("b")]);
    let before = engine.get_tree("today", &AllItems).unwrap();
    assert_eq!(before.root_ids(), ["a".to_string(), "b".to_string()]);

    store.upsert(
        Item::new("b")
            .with_parent("a")
            .with_updated_at(chrono::Utc::now()),
    );
    let after = engine
        .incremental_update("today", &["b".to_string()], &AllItems)
        .unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.depth("b"), Some(1));
    assert_eq!(after.root_ids(), ["a".to_string()]);
}

#[test]
fn large_tree_raises_a_warning_without_failing() {
    let mut items = vec![Item::new("root")];
    for i in 0..600 {
        items.push(Item::new(format!("leaf-{:03}", i)).with_parent("root"));
    }
    let (engine, _) = engine_with(items);

    let tree = engine.get_tree("big", &AllItems).unwrap();
    assert_eq!(tree.len(), 601);
    assert!(engine.perf().warning_count() >= 1);
    assert_eq!(engine.perf().summary(ops::BUILD_TREE).unwrap().count, 1);
}

#[test]
fn raising_thresholds_silences_warnings() {
    let mut items = vec![Item::new("root")];
    for i in 0..600 {
        items.push(Item::new(format!("leaf-{:03}", i)).with_parent("root"));
    }
    let (engine, _) = engine_with(items);
    engine.perf().set_thresholds(PerfThresholds {
        large_tree_nodes: 10_000,
        build_tree_ms: 60_000.0,
        ..PerfThresholds::default()
    });

    engine.get_tree("big", &AllItems).unwrap();
    assert_eq!(engine.perf().warning_count(), 0);
}

#[test]
fn report_lists_instrumented_operations() {
    let (engine, store) = engine_with(vec![Item::new("a"), Item::new("b").with_parent("a")]);
    engine.item_created("b").unwrap();
    store.set_parent("b", None);
    engine.item_reparented("b").unwrap();
    engine.get_tree("all", &AllItems).unwrap();

    let report = engine.perf().render_report();
    for op in [ops::RESOLVE_ROOT, ops::PROPAGATE_ROOT, ops::BUILD_TREE, "reparent"] {
        assert!(report.contains(op), "missing {} in report:\n{}", op, report);
    }
}
