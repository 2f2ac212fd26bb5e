//! evtree: Event Tree Root Index and Materialized Views
//!
//! Keeps a derived index from every nested item (event or task) to its
//! topmost ancestor, propagates root changes when subtrees move, caches
//! materialized tree views per scope and instruments the hot paths.

pub mod concurrency;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod logging;
pub mod perf;
pub mod propagate;
pub mod resolver;
pub mod store;
pub mod types;
pub mod views;

pub use engine::EventTreeEngine;
pub use error::{ApiError, StorageError};
pub use types::ItemId;
