//! Error types for the event-tree index.

use thiserror::Error;

/// Failures raised by a backing store (item store or tree index storage).
///
/// These are never retried inside the crate; retry policy belongs to the
/// storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Errors returned by the public engine surface.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("item not found: {0}")]
    ItemNotFound(String),
}

impl From<config::ConfigError> for ApiError {
    fn from(err: config::ConfigError) -> Self {
        ApiError::ConfigError(err.to_string())
    }
}
