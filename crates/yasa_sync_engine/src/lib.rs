//! # YASA Sync Engine
//!
//! Keeps a local media library in step with a YASA sync server.
//!
//! This crate provides:
//! - [`FramedStream`]: newline frames and raw transfers on one connection,
//!   with an explicit mode so the two never interleave
//! - [`Session`]: lockstep request/response with cancellation and deadlines
//! - [`pull_file`] / [`push_file`]: the raw file transfer sub-protocol
//! - [`LibraryAdapter`]: where pulled files are placed
//! - [`SyncEngine`]: the pull-then-push cycle
//!
//! ## Architecture
//!
//! A cycle runs over a single connection:
//! 1. Pull the server's changes since the last successful sync and apply
//!    them in delivery order, fetching and verifying each new file
//! 2. Push local additions (the server assigns their ids) and deletions
//! 3. Record the new checkpoint
//!
//! ## Key Invariants
//!
//! - One request, one reply; nothing is pipelined
//! - Every applied change is committed before the next one starts
//! - A pulled file whose digest does not match is never recorded
//! - The checkpoint only moves after a fully successful cycle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod config;
mod error;
mod framed;
mod library;
mod state;
mod transfer;
mod transport;

pub use cancel::{CancelToken, Interrupt};
pub use config::{SyncConfig, DEFAULT_SERVER_ADDR};
pub use error::{SyncError, SyncResult};
pub use framed::{Expecting, FramedStream, RawGuard};
#[cfg(target_os = "macos")]
pub use library::ITunesLibrary;
pub use library::{
    platform_default, DirectoryLibrary, LibraryAdapter, LibraryError, LibraryResult, NoopLibrary,
    UnsupportedLibrary,
};
pub use state::{PullSummary, PushSummary, SyncCycleResult, SyncEngine, SyncState, SyncStats};
pub use transfer::{pull_file, push_file};
pub use transport::Session;
