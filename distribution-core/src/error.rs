//! Error types for the distribution core

use thiserror::Error;

/// Result type for distribution operations
pub type Result<T> = std::result::Result<T, Error>;

/// Distribution core errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Transaction not found
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// Distribution not found
    #[error("Distribution not found: {0}")]
    DistributionNotFound(String),

    /// Compare-and-set lost a race or an illegal transition was attempted
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Delivery collaborator failure (retryable up to the policy limit)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (worker channel closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
