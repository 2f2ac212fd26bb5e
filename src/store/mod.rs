//! Item Store
//!
//! Contract for the external store that owns items (events and tasks).
//! The index never writes here; it only performs point lookups and
//! parent → children lookups.

pub mod memory;

use crate::error::StorageError;
use crate::types::ItemId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory::MemoryItemStore;

/// Item: an event or task that may be nested under another item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub parent_event_id: Option<ItemId>,
    /// Explicit sibling position, takes precedence over `created_at`
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Last-modified marker, part of the events hash
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Opaque payload (title, timestamps, ...)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            parent_event_id: None,
            position: None,
            created_at: None,
            updated_at: None,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<ItemId>) -> Self {
        self.parent_event_id = Some(parent_id.into());
        self
    }

    pub fn with_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = Some(updated_at);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_top_level(&self) -> bool {
        self.parent_event_id.is_none()
    }
}

/// Item store interface
pub trait ItemStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Item>, StorageError>;
    fn get_by_parent(&self, parent_id: &str) -> Result<Vec<Item>, StorageError>;
    /// Only used by callers that feed the pure tree builder.
    fn get_all(&self) -> Result<Vec<Item>, StorageError>;
}

/// Decides whether an item participates in a materialized view
pub trait ScopeFilter: Send + Sync {
    fn is_in_scope(&self, item: &Item) -> bool;
}

impl<F> ScopeFilter for F
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    fn is_in_scope(&self, item: &Item) -> bool {
        self(item)
    }
}

/// Scope filter that admits every item
#[derive(Debug, Clone, Copy, Default)]
pub struct AllItems;

impl ScopeFilter for AllItems {
    fn is_in_scope(&self, _item: &Item) -> bool {
        true
    }
}
