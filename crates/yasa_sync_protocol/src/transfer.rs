//! Raw file transfer framing.
//!
//! After a `PULL-FILE` or `PUSH/NEW` frame, file contents travel as raw
//! bytes on the same connection, outside the line discipline:
//!
//! ```text
//! +----------------------+---------------------+-------------------+
//! | SHA-256 digest (32B) | payload length (8B) | payload (len B)   |
//! |                      | big-endian u64      |                   |
//! +----------------------+---------------------+-------------------+
//! ```
//!
//! The digest is the sender's claim; the receiver recomputes it over what
//! actually arrived.

use crate::error::{ProtocolError, ProtocolResult};
use crate::hash::{ContentHash, HASH_LEN};

/// Encoded size of a [`TransferHeader`].
pub const HEADER_LEN: usize = HASH_LEN + 8;

/// Largest payload a peer may announce (4 GiB).
pub const MAX_TRANSFER_LEN: u64 = 4 * 1024 * 1024 * 1024;

/// Header preceding a raw file payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    /// Digest the sender computed over the payload.
    pub hash: ContentHash,
    /// Number of payload bytes that follow.
    pub len: u64,
}

impl TransferHeader {
    /// Creates a header.
    pub fn new(hash: ContentHash, len: u64) -> Self {
        Self { hash, len }
    }

    /// Encodes to the fixed-size wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..HASH_LEN].copy_from_slice(self.hash.as_bytes());
        out[HASH_LEN..].copy_from_slice(&self.len.to_be_bytes());
        out
    }

    /// Decodes the fixed-size wire form.
    ///
    /// # Errors
    ///
    /// Fails if the announced length exceeds [`MAX_TRANSFER_LEN`].
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> ProtocolResult<Self> {
        let mut digest = [0u8; HASH_LEN];
        digest.copy_from_slice(&bytes[..HASH_LEN]);

        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[HASH_LEN..]);
        let len = u64::from_be_bytes(len);

        if len > MAX_TRANSFER_LEN {
            return Err(ProtocolError::InvalidHeader(format!(
                "announced length {len} exceeds {MAX_TRANSFER_LEN}"
            )));
        }

        Ok(Self {
            hash: ContentHash::from_digest(digest),
            len,
        })
    }
}
