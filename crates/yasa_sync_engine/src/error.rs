//! Error types for the sync engine.

use crate::library::LibraryError;
use std::io;
use thiserror::Error;
use yasa_codec::CodecError;
use yasa_store::StoreError;
use yasa_sync_protocol::{ContentHash, ProtocolError, ServerId};

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// Every variant aborts the current phase. There is no retry.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The connection broke: refused, reset, a zero-byte write, or EOF.
    #[error("connection error: {0}")]
    Connection(String),

    /// The peer said something outside the protocol, or a frame and a raw
    /// transfer were interleaved.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected a request.
    #[error("server error: {0}")]
    ServerError(String),

    /// A pulled file does not match the digest the server announced.
    #[error("hash mismatch for file {server_id}: expected {expected}, received {actual}")]
    Integrity {
        /// File being pulled.
        server_id: ServerId,
        /// Digest the server claimed.
        expected: ContentHash,
        /// Digest of the bytes that arrived.
        actual: ContentHash,
    },

    /// Local state could not be read or committed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The media library refused an import or removal.
    #[error("library error: {0}")]
    Library(#[from] LibraryError),

    /// Local file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The deadline passed.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Wraps a socket failure.
    pub fn connection(err: impl std::fmt::Display) -> Self {
        Self::Connection(err.to_string())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns true if the error ends the sync cycle.
    ///
    /// Advisory conditions never surface as errors; they are logged and
    /// counted as skipped. Everything that does surface is fatal.
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Connection(_)
            | SyncError::Protocol(_)
            | SyncError::ServerError(_)
            | SyncError::Integrity { .. }
            | SyncError::Store(_)
            | SyncError::Library(_)
            | SyncError::Io(_)
            | SyncError::Cancelled
            | SyncError::Timeout => true,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::ServerError(message) => SyncError::ServerError(message),
            other => SyncError::Protocol(other.to_string()),
        }
    }
}

impl From<CodecError> for SyncError {
    fn from(err: CodecError) -> Self {
        SyncError::Protocol(err.to_string())
    }
}
