//! In-memory storage backend for testing.

use crate::backend::StorageBackend;
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// An in-memory storage backend.
///
/// Clones share the same snapshot, so a test can drop a store and reopen
/// another one over the same data to simulate a process restart.
///
/// # Example
///
/// ```rust
/// use yasa_store::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.store(b"{}").unwrap();
/// assert_eq!(backend.load().unwrap().as_deref(), Some(&b"{}"[..]));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Option<Vec<u8>>>>,
    commits: Arc<AtomicU64>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many snapshots have been stored.
    #[must_use]
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::SeqCst)
    }
}

impl StorageBackend for InMemoryBackend {
    fn load(&self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn store(&mut self, data: &[u8]) -> StoreResult<()> {
        *self.data.write() = Some(data.to_vec());
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
