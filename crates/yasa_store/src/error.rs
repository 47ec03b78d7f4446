//! Error types for store operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading or committing local state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The persisted state could not be parsed or written.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the store lock.
    #[error("store is locked by another process: {}", .0.display())]
    Locked(PathBuf),

    /// A record referenced by local id does not exist.
    #[error("no file record with local id {0}")]
    UnknownFile(u64),

    /// A server id is already attached to another record.
    #[error("server id {0} is already assigned to local file {1}")]
    DuplicateServerId(u64, u64),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Corrupted(err.to_string())
    }
}
