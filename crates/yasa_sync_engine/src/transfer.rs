//! Raw file transfer over a session.
//!
//! Only valid immediately after a `PULL-FILE` request (for [`pull_file`])
//! or a `PUSH/NEW` reply (for [`push_file`]).

use crate::error::{SyncError, SyncResult};
use crate::transport::Session;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;
use yasa_sync_protocol::{ContentHash, TransferHeader, HEADER_LEN};

const CHUNK: usize = 64 * 1024;

/// Receives one file into `destination`.
///
/// Returns the digest the sender announced. The caller is expected to
/// compare it against the bytes actually written.
///
/// # Errors
///
/// `Connection` if the stream ends early, `Protocol` if the header is
/// malformed, `Io` if `destination` cannot be written.
pub fn pull_file<S: Read + Write>(
    session: &mut Session<S>,
    destination: &Path,
) -> SyncResult<ContentHash> {
    let mut raw = session.begin_raw();

    let mut header = [0u8; HEADER_LEN];
    raw.read_raw_exact(&mut header)?;
    let header = TransferHeader::decode(&header)?;
    debug!(
        "Receiving {} bytes into {}",
        header.len,
        destination.display()
    );

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;
    let mut out = BufWriter::new(file);
    let mut chunk = vec![0u8; CHUNK];
    let mut remaining = header.len;
    while remaining > 0 {
        let n = usize::try_from(remaining).map_or(CHUNK, |r| r.min(CHUNK));
        raw.read_raw_exact(&mut chunk[..n])?;
        out.write_all(&chunk[..n])?;
        remaining -= n as u64;
    }
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;

    Ok(header.hash)
}

/// Sends the file at `path`, announcing `hash` as its digest.
///
/// # Errors
///
/// `Io` if the file cannot be read or shrinks while sending,
/// `Connection` if the stream fails.
pub fn push_file<S: Read + Write>(
    session: &mut Session<S>,
    path: &Path,
    hash: &ContentHash,
) -> SyncResult<()> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    debug!("Sending {} ({} bytes)", path.display(), len);

    let mut raw = session.begin_raw();
    raw.write_raw(&TransferHeader::new(*hash, len).encode())?;

    let mut reader = file.take(len);
    let mut chunk = vec![0u8; CHUNK];
    let mut sent = 0u64;
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        raw.write_raw(&chunk[..n])?;
        sent += n as u64;
    }

    if sent != len {
        return Err(SyncError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{} shrank while sending: {sent} of {len} bytes", path.display()),
        )));
    }
    Ok(())
}
