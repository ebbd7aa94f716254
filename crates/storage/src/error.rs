//! Errors raised by the durable key-value backends.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("etcd operation failed: {0}")]
    Etcd(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key not found")]
    NotFound,
}

pub type StorageResult<T> = Result<T, StorageError>;
