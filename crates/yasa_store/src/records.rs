//! Persisted record types.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use yasa_sync_protocol::{ContentHash, ServerId, Timestamp};

/// A file known to the local library.
///
/// `server_id` is `Some` exactly when the file has been round-tripped with
/// the server: either pulled from it, or pushed and acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Local identity, assigned by the store.
    pub local_id: u64,
    /// Server identity, once assigned.
    pub server_id: Option<ServerId>,
    /// Where the file resides in the local library.
    pub path: PathBuf,
    /// Digest of the file's contents.
    pub hash: ContentHash,
    /// Size in bytes.
    pub size: u64,
    /// When the record was created.
    pub added_at: Timestamp,
}

impl FileRecord {
    /// Returns true if the server has never heard of this file.
    pub fn is_unannounced(&self) -> bool {
        self.server_id.is_none()
    }
}

/// Input for creating a [`FileRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    /// Resident path.
    pub path: PathBuf,
    /// Digest of the contents.
    pub hash: ContentHash,
    /// Size in bytes.
    pub size: u64,
    /// Server identity, if the file came from the server.
    pub server_id: Option<ServerId>,
}

impl NewFile {
    /// Describes a file on disk: hashes it and reads its size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn describe(path: &Path) -> io::Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let hash = ContentHash::of_file(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            hash,
            size,
            server_id: None,
        })
    }

    /// Attaches a server identity.
    #[must_use]
    pub fn with_server_id(mut self, server_id: ServerId) -> Self {
        self.server_id = Some(server_id);
        self
    }
}

/// A tombstone: a file removed locally, pending announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionRecord {
    /// Local identity of the removed file.
    pub local_id: u64,
    /// Server identity of the removed file.
    pub server_id: ServerId,
    /// When the removal happened.
    pub deleted_at: Timestamp,
}
