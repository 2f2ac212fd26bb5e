//! Memory and sled tree indexes must answer identically

use evtree::config::EngineConfig;
use evtree::index::{MemoryTreeIndex, SledTreeIndex, TreeIndex};
use evtree::store::{Item, MemoryItemStore};
use evtree::EventTreeEngine;
use std::sync::Arc;

fn store() -> Arc<MemoryItemStore> {
    Arc::new(MemoryItemStore::from_items([
        Item::new("inbox"),
        Item::new("plan"),
        Item::new("plan-1").with_parent("plan"),
        Item::new("plan-2").with_parent("plan"),
        Item::new("plan-2a").with_parent("plan-2"),
        Item::new("plan-2b").with_parent("plan-2"),
        Item::new("inbox-1").with_parent("inbox"),
    ]))
}

/// Run the same create / move / delete sequence and collect observations
fn exercise(index: Arc<dyn TreeIndex>) -> Vec<(String, String, usize, usize)> {
    let items = store();
    let engine = EventTreeEngine::new(EngineConfig::default(), items.clone(), index).unwrap();
    for id in ["plan-1", "plan-2a", "plan-2b", "inbox-1"] {
        engine.item_created(id).unwrap();
    }

    items.set_parent("plan-2", Some("inbox-1"));
    engine.item_reparented("plan-2").unwrap();

    items.remove("plan-1");
    engine.item_deleted("plan-1").unwrap();

    ["inbox", "inbox-1", "plan", "plan-2", "plan-2a", "plan-2b"]
        .iter()
        .map(|id| {
            let ctx = engine.tree_context(id).unwrap();
            (id.to_string(), ctx.root_id, ctx.subtree_count, ctx.direct_child_count)
        })
        .collect()
}

#[test]
fn memory_and_sled_agree() {
    let memory = exercise(Arc::new(MemoryTreeIndex::new()));
    let sled = exercise(Arc::new(SledTreeIndex::temporary().unwrap()));
    assert_eq!(memory, sled);

    let inbox = &memory[0];
    assert_eq!(inbox.1, "inbox");
    // inbox-1, plan-2, plan-2a, plan-2b
    assert_eq!(inbox.2, 4);
    let plan = &memory[2];
    assert_eq!(plan.1, "plan");
    assert_eq!(plan.2, 0);
}

#[test]
fn sled_index_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let items = store();

    {
        let index = Arc::new(SledTreeIndex::open(&dir.path().join("tree-index")).unwrap());
        let engine =
            EventTreeEngine::new(EngineConfig::default(), items.clone(), index.clone()).unwrap();
        assert_eq!(engine.resolve_root("plan-2b").unwrap(), "plan");
        index.flush().unwrap();
    }

    let reopened = SledTreeIndex::open(&dir.path().join("tree-index")).unwrap();
    let entry = reopened.get("plan-2b").unwrap().unwrap();
    assert_eq!(entry.root_event_id.as_deref(), Some("plan"));
    assert_eq!(entry.parent_event_id.as_deref(), Some("plan-2"));
    assert_eq!(reopened.count_subtree_of("plan").unwrap(), 2);
    assert_eq!(reopened.count_children_of("plan").unwrap(), 1);
}
