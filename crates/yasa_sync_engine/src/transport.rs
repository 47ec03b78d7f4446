//! Transport session: lockstep request/response over one connection.

use crate::cancel::{CancelToken, Interrupt};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::framed::{FramedStream, RawGuard};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use tracing::debug;
use yasa_codec::Value;
use yasa_sync_protocol::{ProtocolError, Request, Response, KEY_ERROR};

/// One connection to the sync server.
///
/// Requests are strictly lockstep: [`Session::communicate`] takes
/// `&mut self`, so a second request cannot be issued before the first
/// reply has been read.
#[derive(Debug)]
pub struct Session<S> {
    framed: FramedStream<S>,
}

impl Session<TcpStream> {
    /// Connects to the configured server.
    ///
    /// If the configuration enables polling, the socket gets a read timeout
    /// so blocked reads periodically consult `cancel` and the deadline.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the address does not resolve or every
    /// candidate refuses.
    pub fn connect(config: &SyncConfig, interrupt: Interrupt) -> SyncResult<Self> {
        debug!("Connecting to {}", config.server_addr);

        let addrs = config
            .server_addr
            .to_socket_addrs()
            .map_err(SyncError::connection)?;

        let mut last_err = None;
        let mut connected = None;
        for addr in addrs {
            interrupt.check()?;
            let attempt = match config.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    connected = Some(stream);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }

        let stream = match (connected, last_err) {
            (Some(stream), _) => stream,
            (None, Some(e)) => return Err(SyncError::connection(e)),
            (None, None) => {
                return Err(SyncError::Connection(format!(
                    "{} did not resolve to any address",
                    config.server_addr
                )))
            }
        };

        // Blocked reads and writes both wake on this interval to consult
        // the interrupt.
        let poll = config.effective_poll_interval();
        stream.set_read_timeout(poll).map_err(SyncError::connection)?;
        stream.set_write_timeout(poll).map_err(SyncError::connection)?;
        stream.set_nodelay(true).map_err(SyncError::connection)?;

        Ok(Self::new(stream, interrupt))
    }
}

impl<S: Read + Write> Session<S> {
    /// Wraps an already connected stream.
    pub fn new(stream: S, interrupt: Interrupt) -> Self {
        Self {
            framed: FramedStream::new(stream).with_interrupt(interrupt),
        }
    }

    /// Wraps a stream with no cancellation and no deadline.
    pub fn from_stream(stream: S) -> Self {
        Self::new(stream, Interrupt::new(CancelToken::new()))
    }

    /// Sends raw bytes, resubmitting the remainder after short writes.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the stream accepts zero bytes or fails.
    pub fn send(&mut self, bytes: &[u8]) -> SyncResult<()> {
        self.framed.write_bytes(bytes)
    }

    /// Sends one request frame without waiting for a reply.
    ///
    /// Used before a raw transfer, whose bytes follow instead of a reply.
    pub fn send_request(&mut self, request: &Request) -> SyncResult<()> {
        let frame = request.encode()?;
        self.framed.write_frame(&frame)
    }

    /// Sends one request and blocks for exactly one reply.
    ///
    /// # Errors
    ///
    /// `ServerError` if the reply carries `ERROR`, `Protocol` if it does
    /// not fit the request, `Connection` on transport failure.
    pub fn communicate(&mut self, request: &Request) -> SyncResult<Response> {
        self.send_request(request)?;
        let reply = self.next_response()?;
        Ok(request.parse_reply(&reply)?)
    }

    /// Consumes one reply frame as-is.
    ///
    /// A frame carrying `ERROR` is turned into `ServerError`; anything else
    /// is returned undecoded.
    pub fn next_response(&mut self) -> SyncResult<Value> {
        let frame = self.framed.next_frame()?;
        if let Some(error) = frame.get(KEY_ERROR) {
            let message = error
                .as_text()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{error:?}"));
            return Err(ProtocolError::ServerError(message).into());
        }
        Ok(frame)
    }

    /// Switches the connection to raw transfer mode.
    pub fn begin_raw(&mut self) -> RawGuard<'_, S> {
        self.framed.begin_raw()
    }

    /// Borrows the framed stream.
    pub fn framed(&self) -> &FramedStream<S> {
        &self.framed
    }
}
