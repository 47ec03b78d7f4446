//! # YASA Store
//!
//! Durable local state for the YASA sync client.
//!
//! The store remembers which files the client holds, which of them the
//! server knows about, which local deletions still need announcing, and
//! when the last fully successful sync happened.
//!
//! ## Layers
//!
//! - [`StorageBackend`] is an opaque snapshot store: load the last
//!   committed bytes, atomically replace them.
//! - [`InMemoryBackend`] is for tests and ephemeral sessions.
//! - [`FileBackend`] persists to a single file with atomic replacement
//!   and an advisory process lock.
//! - [`LocalStore`] owns the typed state and commits it through a backend
//!   one [`Transaction`] at a time.
//!
//! ## Example
//!
//! ```rust
//! use yasa_store::LocalStore;
//! use yasa_sync_protocol::Timestamp;
//!
//! let store = LocalStore::in_memory();
//! assert_eq!(store.last_update(), Timestamp::ZERO);
//!
//! store.set_last_update(Timestamp(1_700_000_000_000)).unwrap();
//! assert_eq!(store.last_update().as_millis(), 1_700_000_000_000);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod records;
mod store;

pub use backend::StorageBackend;
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use records::{DeletionRecord, FileRecord, NewFile};
pub use store::{LocalStore, Transaction};
