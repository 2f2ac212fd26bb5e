//! Event tree engine
//!
//! Owns one instance of every component, built from an [`EngineConfig`] with
//! injected item store and tree index. Applications call the lifecycle hooks
//! (`item_created`, `item_reparented`, `item_deleted`) after mutating the
//! item store, and query roots, contexts and tree views through here.

use crate::concurrency::SubtreeLockManager;
use crate::config::{ConfigLoader, EngineConfig};
use crate::error::ApiError;
use crate::index::{SledTreeIndex, TreeIndex, TreeIndexEntry};
use crate::perf::{Metadata, PerfMonitor};
use crate::propagate::{PropagationReport, ReparentPropagator};
use crate::resolver::{RootResolver, TreeContext};
use crate::store::{ItemStore, ScopeFilter};
use crate::types::ItemId;
use crate::views::{MaterializedTree, TreeViewCache};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Event tree engine
pub struct EventTreeEngine {
    items: Arc<dyn ItemStore>,
    index: Arc<dyn TreeIndex>,
    locks: Arc<SubtreeLockManager>,
    perf: Arc<PerfMonitor>,
    resolver: RootResolver,
    propagator: ReparentPropagator,
    cache: TreeViewCache,
    config: EngineConfig,
    timer_seq: AtomicU64,
}

impl EventTreeEngine {
    pub fn new(
        config: EngineConfig,
        items: Arc<dyn ItemStore>,
        index: Arc<dyn TreeIndex>,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        let locks = Arc::new(SubtreeLockManager::new());
        let perf = Arc::new(PerfMonitor::new(config.perf.clone()));
        let resolver = RootResolver::new(
            items.clone(),
            index.clone(),
            locks.clone(),
            perf.clone(),
            config.resolver.clone(),
        );
        let propagator = ReparentPropagator::new(index.clone(), locks.clone(), perf.clone());
        let cache = TreeViewCache::new(config.cache.clone(), perf.clone());
        debug!(
            max_hops = config.resolver.max_hops,
            cache_capacity = config.cache.capacity,
            "Event tree engine created"
        );
        Ok(Self {
            items,
            index,
            locks,
            perf,
            resolver,
            propagator,
            cache,
            config,
            timer_seq: AtomicU64::new(0),
        })
    }

    /// Engine backed by a sled tree index at the configured path
    pub fn with_sled(config: EngineConfig, items: Arc<dyn ItemStore>) -> Result<Self, ApiError> {
        let path = config.storage.resolve_index_path()?;
        let index = SledTreeIndex::open(&path)?;
        info!(path = %path.display(), "Opened tree index");
        Self::new(config, items, Arc::new(index))
    }

    /// Load configuration (defaults, optional file, environment) and open
    /// the sled tree index
    pub fn load(config_path: Option<&Path>, items: Arc<dyn ItemStore>) -> Result<Self, ApiError> {
        let config = ConfigLoader::load(config_path)?;
        Self::with_sled(config, items)
    }

    pub fn resolve_root(&self, id: &str) -> Result<ItemId, ApiError> {
        self.resolver.resolve_root(id)
    }

    pub fn tree_context(&self, id: &str) -> Result<TreeContext, ApiError> {
        self.resolver.tree_context(id)
    }

    /// Index a newly created item
    pub fn item_created(&self, id: &str) -> Result<TreeIndexEntry, ApiError> {
        self.resolver.register(id)
    }

    /// Re-index an item whose parent changed in the item store, together
    /// with its indexed descendants
    pub fn item_reparented(&self, id: &str) -> Result<PropagationReport, ApiError> {
        let timer_id = format!(
            "reparent-{}-{}",
            id,
            self.timer_seq.fetch_add(1, Ordering::Relaxed)
        );
        let mut metadata = Metadata::new();
        metadata.insert("item_id".to_string(), id.into());
        self.perf.start(&timer_id, "reparent", metadata);

        let result = self.reparent(id);

        let mut outcome = Metadata::new();
        if let Ok(report) = &result {
            outcome.insert("updated".to_string(), report.updated.into());
        }
        self.perf.end(&timer_id, outcome);
        result
    }

    fn reparent(&self, id: &str) -> Result<PropagationReport, ApiError> {
        let item = self
            .items
            .get(id)?
            .ok_or_else(|| ApiError::ItemNotFound(id.to_string()))?;
        let new_root = match item.parent_event_id.as_deref() {
            None => id.to_string(),
            Some(parent_id) => match self.resolver.resolve_root(parent_id) {
                Ok(root) => root,
                // Stale parent reference: the item becomes its own root
                Err(ApiError::ItemNotFound(_)) => id.to_string(),
                Err(e) => return Err(e),
            },
        };
        Ok(self
            .propagator
            .reparent(id, item.parent_event_id.as_deref(), &new_root)?)
    }

    /// Point every indexed descendant of `subtree_root_id` at `new_root_id`
    pub fn propagate_root(
        &self,
        subtree_root_id: &str,
        new_root_id: &str,
    ) -> Result<PropagationReport, ApiError> {
        Ok(self.propagator.propagate_root(subtree_root_id, new_root_id)?)
    }

    /// Drop a permanently deleted item from the index
    pub fn item_deleted(&self, id: &str) -> Result<PropagationReport, ApiError> {
        Ok(self.propagator.invalidate_subtree(id)?)
    }

    /// Tree view for `key` over every item in the store
    pub fn get_tree(
        &self,
        key: &str,
        scope: &dyn ScopeFilter,
    ) -> Result<Arc<MaterializedTree>, ApiError> {
        Ok(self.cache.get_tree_from_store(key, self.items.as_ref(), scope)?)
    }

    /// Tree view for `key` after `changed_ids` were modified
    pub fn incremental_update(
        &self,
        key: &str,
        changed_ids: &[ItemId],
        scope: &dyn ScopeFilter,
    ) -> Result<Arc<MaterializedTree>, ApiError> {
        let items = self.items.get_all()?;
        Ok(self.cache.incremental_update(key, changed_ids, &items, scope))
    }

    pub fn cache(&self) -> &TreeViewCache {
        &self.cache
    }

    pub fn perf(&self) -> &PerfMonitor {
        &self.perf
    }

    pub fn index(&self) -> &dyn TreeIndex {
        self.index.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Release lock entries no operation is holding
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }
}
