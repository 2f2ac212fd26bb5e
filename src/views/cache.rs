//! Tree View Cache
//!
//! Memoizes one [`MaterializedTree`] per scope key. An entry is served while
//! its events hash matches the current item set and it is younger than the
//! TTL. Trees are built outside the lock and swapped in whole, so readers
//! only ever see complete snapshots.

use super::hasher::{compute_events_hash, short_hex};
use super::incremental::{splice, Fallback};
use super::{build_tree, MaterializedTree};
use crate::config::CacheConfig;
use crate::error::StorageError;
use crate::perf::{node_count_metadata, ops, PerfMonitor};
use crate::store::{Item, ItemStore, ScopeFilter};
use crate::types::{Hash, ItemId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

struct CacheEntry {
    tree: Arc<MaterializedTree>,
    events_hash: Hash,
    created: Instant,
    hit_count: u64,
    /// Insertion sequence, breaks hit-count ties in favour of newer entries
    seq: u64,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub full_builds: u64,
    pub incremental_splices: u64,
    pub incremental_fallbacks: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
    next_seq: u64,
}

/// Tree view cache
pub struct TreeViewCache {
    inner: Mutex<Inner>,
    config: CacheConfig,
    perf: Arc<PerfMonitor>,
}

impl TreeViewCache {
    pub fn new(config: CacheConfig, perf: Arc<PerfMonitor>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                stats: CacheStats::default(),
                next_seq: 0,
            }),
            config,
            perf,
        }
    }

    /// Cached tree for `key`, rebuilt when the in-scope item set changed or
    /// the entry expired
    pub fn get_tree(
        &self,
        key: &str,
        items: &[Item],
        scope: &dyn ScopeFilter,
    ) -> Arc<MaterializedTree> {
        let scoped: Vec<&Item> = items.iter().filter(|i| scope.is_in_scope(i)).collect();
        let events_hash = compute_events_hash(scoped.iter().copied());
        if let Some(tree) = self.lookup(key, &events_hash) {
            return tree;
        }
        let tree = self.full_build(items, scope);
        self.store(key, tree, events_hash)
    }

    /// Same as [`Self::get_tree`], reading every item from `store`
    pub fn get_tree_from_store(
        &self,
        key: &str,
        store: &dyn ItemStore,
        scope: &dyn ScopeFilter,
    ) -> Result<Arc<MaterializedTree>, StorageError> {
        let items = store.get_all()?;
        Ok(self.get_tree(key, &items, scope))
    }

    /// Rebuild `key` after `changed_ids` were modified, splicing unaffected
    /// subtrees from the cached tree when few enough subtrees are touched.
    ///
    /// The result is always identical to a full build over `items`.
    pub fn incremental_update(
        &self,
        key: &str,
        changed_ids: &[ItemId],
        items: &[Item],
        scope: &dyn ScopeFilter,
    ) -> Arc<MaterializedTree> {
        let previous = self.inner.lock().entries.get(key).map(|e| e.tree.clone());
        let Some(previous) = previous else {
            return self.get_tree(key, items, scope);
        };

        let scoped: Vec<Item> = items
            .iter()
            .filter(|i| scope.is_in_scope(i))
            .cloned()
            .collect();
        let events_hash = compute_events_hash(scoped.iter());
        if let Some(tree) = self.lookup(key, &events_hash) {
            return tree;
        }

        let changed: HashSet<ItemId> = changed_ids.iter().cloned().collect();
        let started = Instant::now();
        let tree = match splice(
            &previous,
            scoped,
            &changed,
            self.config.incremental_threshold,
            self.config.max_ancestor_walk,
        ) {
            Ok(outcome) => {
                self.perf.record(
                    ops::INCREMENTAL_BUILD,
                    started.elapsed(),
                    node_count_metadata(outcome.tree.len()),
                );
                debug!(
                    cache_key = key,
                    affected_roots = outcome.affected_roots,
                    reused_nodes = outcome.reused_nodes,
                    "Spliced incremental tree update"
                );
                self.inner.lock().stats.incremental_splices += 1;
                outcome.tree
            }
            Err(reason) => {
                match &reason {
                    Fallback::OverThreshold { affected, limit } => info!(
                        cache_key = key,
                        affected, limit, "Too many affected subtrees, rebuilding tree"
                    ),
                    other => debug!(cache_key = key, reason = ?other, "Incremental update not possible, rebuilding tree"),
                }
                self.inner.lock().stats.incremental_fallbacks += 1;
                self.full_build(items, scope)
            }
        };
        self.store(key, tree, events_hash)
    }

    /// Drop the entry for `key`
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.stats.invalidations += 1;
            debug!(cache_key = key, "Cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.stats.invalidations += dropped as u64;
        debug!(dropped, "Tree view cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            ..inner.stats
        }
    }

    /// Hit count of the entry for `key`, if cached
    pub fn hit_count(&self, key: &str) -> Option<u64> {
        self.inner.lock().entries.get(key).map(|e| e.hit_count)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    fn lookup(&self, key: &str, events_hash: &Hash) -> Option<Arc<MaterializedTree>> {
        let mut inner = self.inner.lock();
        let ttl = self.config.ttl();
        let fresh = match inner.entries.get_mut(key) {
            Some(entry) if &entry.events_hash == events_hash && entry.created.elapsed() < ttl => {
                entry.hit_count += 1;
                Some(entry.tree.clone())
            }
            _ => None,
        };
        match fresh {
            Some(tree) => {
                inner.stats.hits += 1;
                Some(tree)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    fn full_build(&self, items: &[Item], scope: &dyn ScopeFilter) -> MaterializedTree {
        let started = Instant::now();
        let tree = build_tree(items, scope);
        self.perf.record(
            ops::BUILD_TREE,
            started.elapsed(),
            node_count_metadata(tree.len()),
        );
        self.inner.lock().stats.full_builds += 1;
        tree
    }

    fn store(&self, key: &str, tree: MaterializedTree, events_hash: Hash) -> Arc<MaterializedTree> {
        let tree = Arc::new(tree);
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                tree: tree.clone(),
                events_hash,
                created: Instant::now(),
                hit_count: 0,
                seq,
            },
        );
        debug!(
            cache_key = key,
            events_hash = %short_hex(&events_hash),
            nodes = tree.len(),
            "Tree view cached"
        );
        Self::evict(&mut inner, self.config.capacity);
        tree
    }

    /// Keep the `capacity` most frequently hit entries
    fn evict(inner: &mut Inner, capacity: usize) {
        if inner.entries.len() <= capacity {
            return;
        }
        let mut ranked: Vec<(u64, u64, String)> = inner
            .entries
            .iter()
            .map(|(key, e)| (e.hit_count, e.seq, key.clone()))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
        for (hits, _, key) in ranked.into_iter().skip(capacity) {
            inner.entries.remove(&key);
            inner.stats.evictions += 1;
            debug!(cache_key = %key, hit_count = hits, "Evicted tree view");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{AllItems, MemoryItemStore};
    use chrono::{TimeZone, Utc};

    fn cache(config: CacheConfig) -> TreeViewCache {
        TreeViewCache::new(config, Arc::new(PerfMonitor::default()))
    }

    fn items() -> Vec<Item> {
        vec![
            Item::new("a"),
            Item::new("b").with_parent("a"),
            Item::new("c").with_parent("b"),
        ]
    }

    #[test]
    fn test_hit_returns_same_snapshot() {
        let cache = cache(CacheConfig::default());
        let first = cache.get_tree("today", &items(), &AllItems);
        let second = cache.get_tree("today", &items(), &AllItems);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hit_count("today"), Some(1));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.full_builds, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_marker_change_forces_rebuild() {
        let cache = cache(CacheConfig::default());
        let first = cache.get_tree("k", &items(), &AllItems);

        let mut changed = items();
        changed[1] = changed[1]
            .clone()
            .with_updated_at(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        let second = cache.get_tree("k", &changed, &AllItems);

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.hit_count("k"), Some(0));
    }

    #[test]
    fn test_out_of_scope_changes_do_not_invalidate() {
        let cache = cache(CacheConfig::default());
        let scope = |item: &Item| !item.id.starts_with("sys");
        let mut all = items();
        let first = cache.get_tree("k", &all, &scope);
        all.push(Item::new("sys-log"));
        let second = cache.get_tree("k", &all, &scope);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_expired_entry_is_rebuilt() {
        let cache = cache(CacheConfig {
            ttl_ms: 0,
            ..CacheConfig::default()
        });
        let first = cache.get_tree("k", &items(), &AllItems);
        let second = cache.get_tree("k", &items(), &AllItems);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().full_builds, 2);
    }

    #[test]
    fn test_eviction_drops_least_hit() {
        let cache = cache(CacheConfig::default());
        for i in 0..10 {
            let key = format!("scope-{}", i);
            cache.get_tree(&key, &items(), &AllItems);
            // every scope but scope-3 gets a hit
            if i != 3 {
                cache.get_tree(&key, &items(), &AllItems);
            }
        }
        cache.get_tree("scope-10", &items(), &AllItems);
        cache.get_tree("scope-10", &items(), &AllItems);

        assert_eq!(cache.len(), 10);
        assert!(!cache.contains("scope-3"));
        assert!(cache.contains("scope-10"));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_eviction_tie_keeps_newer_entry() {
        let cache = cache(CacheConfig {
            capacity: 2,
            ..CacheConfig::default()
        });
        cache.get_tree("old", &items(), &AllItems);
        cache.get_tree("mid", &items(), &AllItems);
        cache.get_tree("new", &items(), &AllItems);
        assert!(!cache.contains("old"));
        assert!(cache.contains("mid"));
        assert!(cache.contains("new"));
    }

    #[test]
    fn test_incremental_without_entry_builds_fully() {
        let cache = cache(CacheConfig::default());
        let tree = cache.incremental_update("k", &["a".to_string()], &items(), &AllItems);
        assert_eq!(tree.len(), 3);
        assert_eq!(cache.stats().full_builds, 1);
        assert_eq!(cache.stats().incremental_splices, 0);
    }

    #[test]
    fn test_incremental_splice_matches_full_build() {
        let cache = cache(CacheConfig::default());
        let mut all = Vec::new();
        for i in 0..10 {
            all.push(Item::new(format!("r{}", i)));
            all.push(Item::new(format!("r{}-child", i)).with_parent(format!("r{}", i)));
        }
        cache.get_tree("k", &all, &AllItems);

        all.push(Item::new("r4-grandchild").with_parent("r4-child"));
        let tree = cache.incremental_update("k", &["r4-grandchild".to_string()], &all, &AllItems);

        assert_eq!(*tree, build_tree(&all, &AllItems));
        assert_eq!(cache.stats().incremental_splices, 1);
        // The spliced tree is now the cached one
        let again = cache.get_tree("k", &all, &AllItems);
        assert!(Arc::ptr_eq(&tree, &again));
    }

    #[test]
    fn test_incremental_over_threshold_rebuilds() {
        let cache = cache(CacheConfig::default());
        let mut all = items();
        cache.get_tree("k", &all, &AllItems);

        all.push(Item::new("x"));
        all.push(Item::new("y"));
        let ids = vec!["x".to_string(), "y".to_string()];
        let tree = cache.incremental_update("k", &ids, &all, &AllItems);

        assert_eq!(*tree, build_tree(&all, &AllItems));
        let stats = cache.stats();
        assert_eq!(stats.incremental_fallbacks, 1);
        assert_eq!(stats.full_builds, 2);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache = cache(CacheConfig::default());
        cache.get_tree("a", &items(), &AllItems);
        cache.get_tree("b", &items(), &AllItems);

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().invalidations, 2);
    }

    #[test]
    fn test_get_tree_from_store() {
        let cache = cache(CacheConfig::default());
        let store = MemoryItemStore::from_items(items());
        let tree = cache.get_tree_from_store("k", &store, &AllItems).unwrap();
        assert_eq!(tree.depth("c"), Some(2));
    }
}
