//! Integration tests for the event-tree index and tree view cache

mod backend_parity;
mod cache_behaviour;
mod concurrent_reparent;
mod config_loading;
mod root_invariant;
