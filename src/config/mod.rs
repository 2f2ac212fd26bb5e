//! Engine configuration
//!
//! Every field has a serde default, so an empty file (or no file at all)
//! yields the stock configuration. Sources are layered by [`ConfigLoader`].

pub mod facade;
pub mod merge;
pub mod sources;
pub mod storage;

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use facade::ConfigLoader;
pub use storage::StorageConfig;

/// Root resolver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound on parent hops during a root walk
    #[serde(default = "default_max_hops")]
    pub max_hops: usize,

    /// Write resolved roots for every visited ancestor, not only the queried id
    #[serde(default = "default_true")]
    pub compress_path: bool,
}

fn default_max_hops() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            compress_path: default_true(),
        }
    }
}

/// Tree view cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,

    /// Maximum number of cached scopes
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Fraction of the cached node count above which an incremental update
    /// falls back to a full rebuild
    #[serde(default = "default_incremental_threshold")]
    pub incremental_threshold: f64,

    /// Upper bound on parent hops when locating an affected subtree root
    #[serde(default = "default_max_ancestor_walk")]
    pub max_ancestor_walk: usize,
}

fn default_ttl_ms() -> u64 {
    30_000
}

fn default_capacity() -> usize {
    10
}

fn default_incremental_threshold() -> f64 {
    0.2
}

fn default_max_ancestor_walk() -> usize {
    100
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            capacity: default_capacity(),
            incremental_threshold: default_incremental_threshold(),
            max_ancestor_walk: default_max_ancestor_walk(),
        }
    }
}

/// Warning thresholds for performance instrumentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfThresholds {
    /// Re-parent / indent style operations slower than this are reported
    #[serde(default = "default_reparent_ms")]
    pub reparent_ms: f64,

    /// Tree builds slower than this are reported when the tree is small
    #[serde(default = "default_build_tree_ms")]
    pub build_tree_ms: f64,

    /// Node count below which a tree counts as small
    #[serde(default = "default_small_tree_nodes")]
    pub small_tree_nodes: usize,

    /// Trees above this node count are reported regardless of duration
    #[serde(default = "default_large_tree_nodes")]
    pub large_tree_nodes: usize,
}

fn default_reparent_ms() -> f64 {
    100.0
}

fn default_build_tree_ms() -> f64 {
    50.0
}

fn default_small_tree_nodes() -> usize {
    200
}

fn default_large_tree_nodes() -> usize {
    500
}

impl Default for PerfThresholds {
    fn default() -> Self {
        Self {
            reparent_ms: default_reparent_ms(),
            build_tree_ms: default_build_tree_ms(),
            small_tree_nodes: default_small_tree_nodes(),
            large_tree_nodes: default_large_tree_nodes(),
        }
    }
}

/// Performance instrumentation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfConfig {
    /// Rolling history kept per operation name
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    #[serde(default)]
    pub thresholds: PerfThresholds,

    /// Name fragments that mark an operation as re-parent / indent style
    #[serde(default = "default_reparent_operations")]
    pub reparent_operations: Vec<String>,

    /// Name fragments that mark an operation as a tree build
    #[serde(default = "default_build_operations")]
    pub build_operations: Vec<String>,
}

fn default_history_size() -> usize {
    100
}

fn default_reparent_operations() -> Vec<String> {
    ["reparent", "indent", "outdent", "propagate"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_build_operations() -> Vec<String> {
    vec!["build_tree".to_string()]
}

impl Default for PerfConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            thresholds: PerfThresholds::default(),
            reparent_operations: default_reparent_operations(),
            build_operations: default_build_operations(),
        }
    }
}

/// Top-level configuration for the event-tree engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub perf: PerfConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> Result<(), crate::error::ApiError> {
        use crate::error::ApiError;

        if self.resolver.max_hops == 0 {
            return Err(ApiError::ConfigError(
                "resolver.max_hops must be at least 1".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ApiError::ConfigError(
                "cache.capacity must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.incremental_threshold) {
            return Err(ApiError::ConfigError(format!(
                "cache.incremental_threshold must be within 0.0..=1.0, got {}",
                self.cache.incremental_threshold
            )));
        }
        if self.perf.history_size == 0 {
            return Err(ApiError::ConfigError(
                "perf.history_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
