//! # YASA Sync Protocol
//!
//! Protocol types for the YASA media-library sync client.
//!
//! This crate provides:
//! - Typed requests and replies ([`Request`], [`Response`]) over the
//!   line-framed wire format of `yasa_codec`
//! - [`ChangeRecord`] for the ordered NEW/DELETE deltas a pull returns
//! - [`ContentHash`] (SHA-256) for transfer integrity
//! - [`TransferHeader`] for the raw file bytes that follow a
//!   `PULL-FILE` or `PUSH/NEW` request
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod error;
mod hash;
mod messages;
mod transfer;

pub use change::{ChangeRecord, ChangeType, ServerId, Timestamp};
pub use error::{ProtocolError, ProtocolResult};
pub use hash::{ContentHash, ContentHasher, HASH_LEN};
pub use messages::{
    Request, Response, KEY_ACTION, KEY_CHANGES, KEY_ERROR, KEY_ID, KEY_SINCE, KEY_TYPE,
};
pub use transfer::{TransferHeader, HEADER_LEN, MAX_TRANSFER_LEN};
