//! Core types for the event-tree index.

/// ItemId: identifier of an item (event or task) in the external item store
pub type ItemId = String;

/// Hash: Generic 256-bit hash value
pub type Hash = [u8; 32];
