//! Performance Instrumentation
//!
//! Times named operations, keeps a bounded rolling history per operation and
//! reports percentiles on demand. Threshold breaches are logged as warnings
//! and counted; they never fail the measured operation.

use crate::config::{PerfConfig, PerfThresholds};
use chrono::{DateTime, Utc};
use comfy_table::Table;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Operation names recorded by this crate
pub mod ops {
    pub const RESOLVE_ROOT: &str = "resolve_root";
    pub const TREE_CONTEXT: &str = "tree_context";
    pub const PROPAGATE_ROOT: &str = "reparent.propagate_root";
    pub const INVALIDATE_SUBTREE: &str = "reparent.invalidate_subtree";
    pub const BUILD_TREE: &str = "build_tree";
    pub const INCREMENTAL_BUILD: &str = "build_tree.incremental";
}

/// Free-form metadata attached to a sample
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key carrying the node count of a built tree
pub const NODE_COUNT: &str = "node_count";

/// A single timed operation
#[derive(Debug, Clone)]
pub struct PerfSample {
    pub operation: String,
    pub duration: Duration,
    pub metadata: Metadata,
    pub recorded_at: DateTime<Utc>,
}

impl PerfSample {
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_nanos() as f64 / 1_000_000.0
    }

    fn node_count(&self) -> Option<usize> {
        self.metadata
            .get(NODE_COUNT)
            .and_then(serde_json::Value::as_u64)
            .map(|n| n as usize)
    }
}

/// Aggregated durations for one operation, in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerfSummary {
    pub operation: String,
    pub count: usize,
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

/// Threshold breach
#[derive(Debug, Clone, PartialEq)]
pub enum PerfWarning {
    SlowReparent {
        operation: String,
        duration_ms: f64,
        threshold_ms: f64,
    },
    SlowBuild {
        operation: String,
        duration_ms: f64,
        node_count: usize,
        threshold_ms: f64,
    },
    LargeTree {
        operation: String,
        node_count: usize,
        threshold_nodes: usize,
    },
}

/// Check one sample against the configured thresholds
pub fn evaluate(config: &PerfConfig, sample: &PerfSample) -> Vec<PerfWarning> {
    let thresholds = &config.thresholds;
    let matches = |fragments: &[String]| {
        let op = sample.operation.to_lowercase();
        fragments.iter().any(|f| op.contains(&f.to_lowercase()))
    };
    let mut warnings = Vec::new();

    if matches(&config.reparent_operations) && sample.duration_ms() > thresholds.reparent_ms {
        warnings.push(PerfWarning::SlowReparent {
            operation: sample.operation.clone(),
            duration_ms: sample.duration_ms(),
            threshold_ms: thresholds.reparent_ms,
        });
    }

    if matches(&config.build_operations) {
        let node_count = sample.node_count().unwrap_or(0);
        if sample.duration_ms() > thresholds.build_tree_ms
            && node_count < thresholds.small_tree_nodes
        {
            warnings.push(PerfWarning::SlowBuild {
                operation: sample.operation.clone(),
                duration_ms: sample.duration_ms(),
                node_count,
                threshold_ms: thresholds.build_tree_ms,
            });
        }
        if node_count > thresholds.large_tree_nodes {
            warnings.push(PerfWarning::LargeTree {
                operation: sample.operation.clone(),
                node_count,
                threshold_nodes: thresholds.large_tree_nodes,
            });
        }
    }

    warnings
}

/// Nearest-rank percentile over an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

struct ActiveTimer {
    operation: String,
    started: Instant,
    metadata: Metadata,
}

/// Performance monitor
pub struct PerfMonitor {
    config: RwLock<PerfConfig>,
    history: Mutex<HashMap<String, VecDeque<PerfSample>>>,
    active: Mutex<HashMap<String, ActiveTimer>>,
    warnings: AtomicU64,
}

impl PerfMonitor {
    pub fn new(config: PerfConfig) -> Self {
        Self {
            config: RwLock::new(config),
            history: Mutex::new(HashMap::new()),
            active: Mutex::new(HashMap::new()),
            warnings: AtomicU64::new(0),
        }
    }

    /// Start a named timer
    pub fn start(&self, timer_id: &str, operation: &str, metadata: Metadata) {
        debug!(timer_id, operation, "Perf timer started");
        self.active.lock().insert(
            timer_id.to_string(),
            ActiveTimer {
                operation: operation.to_string(),
                started: Instant::now(),
                metadata,
            },
        );
    }

    /// Stop a timer and record its duration. Unknown timers yield `None`.
    pub fn end(&self, timer_id: &str, extra: Metadata) -> Option<Duration> {
        let Some(timer) = self.active.lock().remove(timer_id) else {
            warn!(timer_id, "Perf timer not found");
            return None;
        };
        let duration = timer.started.elapsed();
        let mut metadata = timer.metadata;
        metadata.extend(extra);
        self.record(&timer.operation, duration, metadata);
        Some(duration)
    }

    /// Time a closure under `operation`
    pub fn time<T>(&self, operation: &str, f: impl FnOnce() -> T) -> T {
        let started = Instant::now();
        let out = f();
        self.record(operation, started.elapsed(), Metadata::new());
        out
    }

    /// Record an externally measured duration
    pub fn record(&self, operation: &str, duration: Duration, metadata: Metadata) -> Vec<PerfWarning> {
        let sample = PerfSample {
            operation: operation.to_string(),
            duration,
            metadata,
            recorded_at: Utc::now(),
        };
        let (warnings, history_size) = {
            let config = self.config.read();
            (evaluate(&config, &sample), config.history_size)
        };

        for warning in &warnings {
            self.warnings.fetch_add(1, Ordering::Relaxed);
            match warning {
                PerfWarning::SlowReparent {
                    operation,
                    duration_ms,
                    threshold_ms,
                } => warn!(
                    operation = %operation,
                    duration_ms = *duration_ms,
                    threshold_ms = *threshold_ms,
                    slow_by_ms = duration_ms - threshold_ms,
                    "Re-parent operation slow"
                ),
                PerfWarning::SlowBuild {
                    operation,
                    duration_ms,
                    node_count,
                    threshold_ms,
                } => warn!(
                    operation = %operation,
                    duration_ms = *duration_ms,
                    node_count = *node_count,
                    threshold_ms = *threshold_ms,
                    "Tree build slow for small tree"
                ),
                PerfWarning::LargeTree {
                    operation,
                    node_count,
                    threshold_nodes,
                } => warn!(
                    operation = %operation,
                    node_count = *node_count,
                    threshold_nodes = *threshold_nodes,
                    "Large tree detected, consider paginating the scope"
                ),
            }
        }

        let mut history = self.history.lock();
        let samples = history.entry(sample.operation.clone()).or_default();
        samples.push_back(sample);
        while samples.len() > history_size {
            samples.pop_front();
        }

        warnings
    }

    /// Summary for one operation, `None` when nothing was recorded
    pub fn summary(&self, operation: &str) -> Option<PerfSummary> {
        let history = self.history.lock();
        let samples = history.get(operation)?;
        summarize(operation, samples)
    }

    /// Summaries for all operations, slowest average first
    pub fn summaries(&self) -> Vec<PerfSummary> {
        let history = self.history.lock();
        let mut summaries: Vec<PerfSummary> = history
            .iter()
            .filter_map(|(operation, samples)| summarize(operation, samples))
            .collect();
        summaries.sort_by(|a, b| b.avg_ms.total_cmp(&a.avg_ms));
        summaries
    }

    /// Render all summaries as a text table
    pub fn render_report(&self) -> String {
        let summaries = self.summaries();
        if summaries.is_empty() {
            return "No performance data collected yet.".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec![
            "Operation", "Count", "Avg (ms)", "P50 (ms)", "P95 (ms)", "P99 (ms)", "Min (ms)",
            "Max (ms)",
        ]);
        for s in summaries {
            table.add_row(vec![
                s.operation,
                s.count.to_string(),
                format!("{:.2}", s.avg_ms),
                format!("{:.2}", s.p50_ms),
                format!("{:.2}", s.p95_ms),
                format!("{:.2}", s.p99_ms),
                format!("{:.2}", s.min_ms),
                format!("{:.2}", s.max_ms),
            ]);
        }
        table.to_string()
    }

    pub fn thresholds(&self) -> PerfThresholds {
        self.config.read().thresholds.clone()
    }

    /// Replace thresholds at runtime
    pub fn set_thresholds(&self, thresholds: PerfThresholds) {
        self.config.write().thresholds = thresholds;
    }

    /// Total threshold breaches since creation or the last `clear`
    pub fn warning_count(&self) -> u64 {
        self.warnings.load(Ordering::Relaxed)
    }

    pub fn active_timers(&self) -> usize {
        self.active.lock().len()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
        self.active.lock().clear();
        self.warnings.store(0, Ordering::Relaxed);
        debug!("Performance data cleared");
    }
}

impl Default for PerfMonitor {
    fn default() -> Self {
        Self::new(PerfConfig::default())
    }
}

fn summarize(operation: &str, samples: &VecDeque<PerfSample>) -> Option<PerfSummary> {
    if samples.is_empty() {
        return None;
    }
    let mut durations: Vec<f64> = samples.iter().map(PerfSample::duration_ms).collect();
    durations.sort_by(f64::total_cmp);
    let sum: f64 = durations.iter().sum();
    Some(PerfSummary {
        operation: operation.to_string(),
        count: durations.len(),
        avg_ms: sum / durations.len() as f64,
        min_ms: durations[0],
        max_ms: durations[durations.len() - 1],
        p50_ms: percentile(&durations, 50.0),
        p95_ms: percentile(&durations, 95.0),
        p99_ms: percentile(&durations, 99.0),
    })
}

/// Metadata with a node count, for tree build samples
pub fn node_count_metadata(node_count: usize) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(NODE_COUNT.to_string(), serde_json::Value::from(node_count));
    metadata
}
