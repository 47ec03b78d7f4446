//! The local state store.

use crate::backend::StorageBackend;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use crate::records::{DeletionRecord, FileRecord, NewFile};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use yasa_sync_protocol::{ServerId, Timestamp};

/// Everything the client remembers between sync cycles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreState {
    next_local_id: u64,
    last_update: Timestamp,
    files: BTreeMap<u64, FileRecord>,
    deletions: BTreeMap<u64, DeletionRecord>,
}

/// Durable record of synchronized files, tombstones, and the last sync time.
///
/// Reads see the last committed state. Writes go through
/// [`LocalStore::transaction`], which applies a closure to a draft copy
/// and persists it only if the closure succeeds. Each transaction is
/// durable on return, so callers get crash consistency at whatever
/// granularity they commit.
///
/// # Example
///
/// ```rust
/// use yasa_store::{LocalStore, NewFile};
/// use yasa_sync_protocol::{ContentHash, ServerId};
///
/// let store = LocalStore::in_memory();
/// let local_id = store
///     .transaction(|txn| {
///         txn.insert_file(NewFile {
///             path: "Music/track.mp3".into(),
///             hash: ContentHash::of_bytes(b"track"),
///             size: 5,
///             server_id: Some(ServerId(7)),
///         })
///     })
///     .unwrap();
///
/// assert_eq!(store.file_by_server_id(ServerId(7)).unwrap().local_id, local_id);
/// ```
pub struct LocalStore {
    backend: Mutex<Box<dyn StorageBackend>>,
    state: RwLock<StoreState>,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("files", &state.files.len())
            .field("deletions", &state.deletions.len())
            .field("last_update", &state.last_update)
            .finish()
    }
}

impl LocalStore {
    /// Opens a store over the given backend, loading any persisted state.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted state cannot be read or parsed.
    pub fn open(backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let state = match backend.load()? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => StoreState::default(),
        };

        tracing::debug!(
            files = state.files.len(),
            deletions = state.deletions.len(),
            last_update = %state.last_update,
            "opened local store"
        );

        Ok(Self {
            backend: Mutex::new(backend),
            state: RwLock::new(state),
        })
    }

    /// Opens (or creates) a store persisted at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is locked, unreadable, or corrupted.
    pub fn open_file(path: &Path) -> StoreResult<Self> {
        Self::open(Box::new(FileBackend::open(path)?))
    }

    /// Creates an empty, non-persistent store.
    pub fn in_memory() -> Self {
        Self {
            backend: Mutex::new(Box::new(InMemoryBackend::new())),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Time of the last fully successful sync (zero if never).
    pub fn last_update(&self) -> Timestamp {
        self.state.read().last_update
    }

    /// Records the time of a fully successful sync.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails.
    pub fn set_last_update(&self, at: Timestamp) -> StoreResult<()> {
        self.transaction(|txn| {
            txn.set_last_update(at);
            Ok(())
        })
    }

    /// Looks up a file by local id.
    pub fn file(&self, local_id: u64) -> Option<FileRecord> {
        self.state.read().files.get(&local_id).cloned()
    }

    /// Looks up a file by server id.
    pub fn file_by_server_id(&self, server_id: ServerId) -> Option<FileRecord> {
        find_by_server_id(&self.state.read(), server_id).cloned()
    }

    /// All known files, ordered by local id.
    pub fn files(&self) -> Vec<FileRecord> {
        self.state.read().files.values().cloned().collect()
    }

    /// Files the server has not been told about yet, ordered by local id.
    pub fn unannounced_files(&self) -> Vec<FileRecord> {
        self.state
            .read()
            .files
            .values()
            .filter(|f| f.is_unannounced())
            .cloned()
            .collect()
    }

    /// All pending tombstones, ordered by local id.
    pub fn deletions(&self) -> Vec<DeletionRecord> {
        self.state.read().deletions.values().cloned().collect()
    }

    /// Tombstones created strictly after `since`.
    pub fn deletions_since(&self, since: Timestamp) -> Vec<DeletionRecord> {
        self.state
            .read()
            .deletions
            .values()
            .filter(|d| d.deleted_at > since)
            .cloned()
            .collect()
    }

    /// Registers a file that was added to the library locally.
    ///
    /// The file is hashed and recorded as unannounced, so the next push
    /// announces it. Registering a path that is already known returns the
    /// existing record's local id.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the commit fails.
    pub fn register_file(&self, path: &Path) -> StoreResult<u64> {
        if let Some(existing) = self.state.read().files.values().find(|f| f.path == path) {
            return Ok(existing.local_id);
        }
        let new_file = NewFile::describe(path)?;
        self.transaction(|txn| txn.insert_file(new_file))
    }

    /// Runs `f` as a single all-or-nothing transaction.
    ///
    /// The closure works on a draft of the state. If it returns `Ok`, the
    /// draft is persisted and becomes visible; if it returns `Err` or the
    /// persist fails, nothing changes.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a persistence error.
    pub fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> StoreResult<T>,
    {
        let mut backend = self.backend.lock();
        let mut draft = self.state.read().clone();

        let out = f(&mut Transaction { state: &mut draft })?;

        let bytes = serde_json::to_vec(&draft)?;
        backend.store(&bytes)?;
        *self.state.write() = draft;

        Ok(out)
    }
}

/// A draft of the store state, open for modification.
pub struct Transaction<'a> {
    state: &'a mut StoreState,
}

impl Transaction<'_> {
    /// Looks up a file by server id, seeing this transaction's changes.
    pub fn file_by_server_id(&self, server_id: ServerId) -> Option<&FileRecord> {
        find_by_server_id(self.state, server_id)
    }

    /// Inserts a file record and returns its local id.
    ///
    /// # Errors
    ///
    /// Fails if the server id is already attached to another record.
    pub fn insert_file(&mut self, file: NewFile) -> StoreResult<u64> {
        if let Some(server_id) = file.server_id {
            if let Some(existing) = find_by_server_id(self.state, server_id) {
                return Err(StoreError::DuplicateServerId(
                    server_id.get(),
                    existing.local_id,
                ));
            }
        }

        self.state.next_local_id += 1;
        let local_id = self.state.next_local_id;

        self.state.files.insert(
            local_id,
            FileRecord {
                local_id,
                server_id: file.server_id,
                path: file.path,
                hash: file.hash,
                size: file.size,
                added_at: Timestamp::now(),
            },
        );

        Ok(local_id)
    }

    /// Attaches a server id to an existing record.
    ///
    /// # Errors
    ///
    /// Fails if the record does not exist or the id is taken.
    pub fn set_server_id(&mut self, local_id: u64, server_id: ServerId) -> StoreResult<()> {
        if let Some(existing) = find_by_server_id(self.state, server_id) {
            if existing.local_id != local_id {
                return Err(StoreError::DuplicateServerId(
                    server_id.get(),
                    existing.local_id,
                ));
            }
        }

        let record = self
            .state
            .files
            .get_mut(&local_id)
            .ok_or(StoreError::UnknownFile(local_id))?;
        record.server_id = Some(server_id);
        Ok(())
    }

    /// Removes the record carrying `server_id`, returning it if present.
    ///
    /// This is for server-initiated deletions, so no tombstone is created.
    pub fn remove_file_by_server_id(&mut self, server_id: ServerId) -> Option<FileRecord> {
        let local_id = find_by_server_id(self.state, server_id)?.local_id;
        self.state.files.remove(&local_id)
    }

    /// Removes a file that was deleted locally.
    ///
    /// If the server knows the file, a tombstone is created so the next
    /// push announces the deletion. Files the server never heard of are
    /// simply forgotten.
    ///
    /// # Errors
    ///
    /// Fails if the record does not exist.
    pub fn remove_local_file(
        &mut self,
        local_id: u64,
        at: Timestamp,
    ) -> StoreResult<Option<DeletionRecord>> {
        let record = self
            .state
            .files
            .remove(&local_id)
            .ok_or(StoreError::UnknownFile(local_id))?;

        let Some(server_id) = record.server_id else {
            return Ok(None);
        };

        let tombstone = DeletionRecord {
            local_id,
            server_id,
            deleted_at: at,
        };
        self.state.deletions.insert(local_id, tombstone.clone());
        Ok(Some(tombstone))
    }

    /// Drops a tombstone once the server has acknowledged it.
    ///
    /// Returns false if there was no such tombstone.
    pub fn purge_deletion(&mut self, local_id: u64) -> bool {
        self.state.deletions.remove(&local_id).is_some()
    }

    /// Records the time of a fully successful sync.
    pub fn set_last_update(&mut self, at: Timestamp) {
        self.state.last_update = at;
    }
}

fn find_by_server_id(state: &StoreState, server_id: ServerId) -> Option<&FileRecord> {
    state
        .files
        .values()
        .find(|f| f.server_id == Some(server_id))
}
