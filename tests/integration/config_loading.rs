//! Layered configuration: defaults, TOML file, environment

use evtree::config::ConfigLoader;
use evtree::index::MemoryTreeIndex;
use evtree::store::MemoryItemStore;
use evtree::EventTreeEngine;
use std::sync::Arc;

#[test]
fn file_then_environment_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evtree.toml");
    std::fs::write(
        &path,
        r#"
[cache]
capacity = 4
ttl_ms = 1000

[resolver]
max_hops = 50
"#,
    )
    .unwrap();

    std::env::set_var("EVTREE__CACHE__CAPACITY", "6");
    let loaded = ConfigLoader::load(Some(&path));
    std::env::remove_var("EVTREE__CACHE__CAPACITY");
    let config = loaded.unwrap();

    assert_eq!(config.cache.capacity, 6);
    assert_eq!(config.cache.ttl_ms, 1000);
    assert_eq!(config.resolver.max_hops, 50);
    assert_eq!(config.perf.thresholds.reparent_ms, 100.0);

    let engine = EventTreeEngine::new(
        config,
        Arc::new(MemoryItemStore::new()),
        Arc::new(MemoryTreeIndex::new()),
    )
    .unwrap();
    assert_eq!(engine.config().cache.capacity, 6);
}

#[test]
fn saved_thresholds_drive_the_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("evtree.toml");

    let mut config = ConfigLoader::default();
    config.perf.thresholds.reparent_ms = 5.0;
    ConfigLoader::save(&config, &path).unwrap();

    let loaded = ConfigLoader::load_from_file(&path).unwrap();
    let engine = EventTreeEngine::new(
        loaded,
        Arc::new(MemoryItemStore::new()),
        Arc::new(MemoryTreeIndex::new()),
    )
    .unwrap();
    assert_eq!(engine.perf().thresholds().reparent_ms, 5.0);
}
