//! Storage backend trait definition.

use crate::error::StoreResult;

/// A durable home for the serialized store state.
///
/// Backends are **opaque byte stores**: they hold one snapshot of the
/// state and do not interpret it. `LocalStore` owns the format.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `store`
/// - `store` is atomic: after a crash, `load` yields either the previous
///   snapshot or the new one, never a mix
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync {
    /// Returns the last stored snapshot, or `None` if nothing was stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> StoreResult<Option<Vec<u8>>>;

    /// Atomically replaces the stored snapshot.
    ///
    /// After this returns successfully the snapshot survives process
    /// termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be made durable.
    fn store(&mut self, data: &[u8]) -> StoreResult<()>;
}
