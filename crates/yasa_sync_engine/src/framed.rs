//! Line-framed reader and writer over a byte stream.
//!
//! The connection carries two kinds of traffic: newline-terminated frames,
//! and raw file bytes that follow certain requests. [`FramedStream`] owns
//! the stream and a read buffer and tracks which kind it is expecting, so
//! bytes that arrived early for one kind are never consumed as the other.

use crate::cancel::Interrupt;
use crate::error::{SyncError, SyncResult};
use std::io::{ErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};
use tracing::debug;
use yasa_codec::{decode_frame, Value, MAX_FRAME_LEN};

const READ_CHUNK: usize = 8 * 1024;

/// What the stream is currently carrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expecting {
    /// Newline-terminated frames.
    Frame,
    /// Raw transfer bytes.
    RawBytes,
}

/// A byte stream split into frames and raw transfers.
#[derive(Debug)]
pub struct FramedStream<S> {
    stream: S,
    buf: Vec<u8>,
    mode: Expecting,
    interrupt: Interrupt,
}

impl<S: Read + Write> FramedStream<S> {
    /// Wraps a stream. Starts in frame mode.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            mode: Expecting::Frame,
            interrupt: Interrupt::default(),
        }
    }

    /// Sets what blocked reads consult when they wake up.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Current mode.
    pub fn mode(&self) -> Expecting {
        self.mode
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrows the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Unwraps the stream, discarding buffered bytes.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Reads and decodes the next frame, blocking until a full line arrives.
    ///
    /// # Errors
    ///
    /// `Protocol` if in raw mode or the line is not a valid frame;
    /// `Connection` if the peer closes the stream first.
    pub fn next_frame(&mut self) -> SyncResult<Value> {
        self.require_mode(Expecting::Frame)?;

        let mut scanned = 0;
        let line = loop {
            if let Some(pos) = self.buf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                break line;
            }
            scanned = self.buf.len();

            if self.buf.len() > MAX_FRAME_LEN {
                return Err(SyncError::protocol(format!(
                    "frame exceeds {MAX_FRAME_LEN} bytes without a line terminator"
                )));
            }

            if self.fill()? == 0 {
                return Err(if self.buf.is_empty() {
                    SyncError::Connection("connection closed by peer".into())
                } else {
                    SyncError::Connection("connection closed in the middle of a frame".into())
                });
            }
        };

        let text = String::from_utf8(line)
            .map_err(|_| SyncError::protocol("frame is not valid UTF-8"))?;
        debug!("GOT  <- {}", text.trim_end());

        Ok(decode_frame(&text)?)
    }

    /// Writes one frame followed by a line terminator.
    ///
    /// # Errors
    ///
    /// `Protocol` if in raw mode; `Connection` if the write fails.
    pub fn write_frame(&mut self, frame: &str) -> SyncResult<()> {
        self.require_mode(Expecting::Frame)?;
        debug!("GIVE -> {}", frame);

        let mut line = Vec::with_capacity(frame.len() + 1);
        line.extend_from_slice(frame.as_bytes());
        line.push(b'\n');
        self.write_bytes(&line)
    }

    /// Switches to raw mode until the returned guard is dropped.
    pub fn begin_raw(&mut self) -> RawGuard<'_, S> {
        self.mode = Expecting::RawBytes;
        RawGuard { framed: self }
    }

    /// Fills `out` with raw bytes, draining buffered bytes first.
    ///
    /// # Errors
    ///
    /// `Protocol` if in frame mode; `Connection` on EOF before `out` is full.
    pub fn read_raw_exact(&mut self, out: &mut [u8]) -> SyncResult<()> {
        self.require_mode(Expecting::RawBytes)?;

        let from_buf = self.buf.len().min(out.len());
        out[..from_buf].copy_from_slice(&self.buf[..from_buf]);
        self.buf.drain(..from_buf);

        let mut filled = from_buf;
        while filled < out.len() {
            let n = self.read_some(&mut out[filled..])?;
            if n == 0 {
                return Err(SyncError::Connection(format!(
                    "connection closed during raw transfer ({filled} of {} bytes)",
                    out.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes raw bytes.
    ///
    /// # Errors
    ///
    /// `Protocol` if in frame mode; `Connection` if the write fails.
    pub fn write_raw(&mut self, data: &[u8]) -> SyncResult<()> {
        self.require_mode(Expecting::RawBytes)?;
        self.write_bytes(data)
    }

    /// Writes all of `data`, resubmitting the remainder after short writes.
    pub(crate) fn write_bytes(&mut self, data: &[u8]) -> SyncResult<()> {
        let mut rest = data;
        while !rest.is_empty() {
            self.interrupt.check()?;
            match self.stream.write(rest) {
                Ok(0) => {
                    return Err(SyncError::Connection(
                        "socket connection broken: zero bytes accepted".into(),
                    ))
                }
                Ok(n) => rest = &rest[n..],
                Err(e) if is_wakeup(e.kind()) => continue,
                Err(e) => return Err(SyncError::connection(e)),
            }
        }
        self.stream.flush().map_err(SyncError::connection)
    }

    fn require_mode(&self, mode: Expecting) -> SyncResult<()> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(SyncError::protocol(format!(
                "expected {:?} traffic but stream is in {:?} mode",
                mode, self.mode
            )))
        }
    }

    fn fill(&mut self) -> SyncResult<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self.read_some(&mut chunk)?;
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(n)
    }

    /// One read from the stream. Wakeups from a read timeout consult the
    /// interrupt and then read again.
    fn read_some(&mut self, out: &mut [u8]) -> SyncResult<usize> {
        loop {
            self.interrupt.check()?;
            match self.stream.read(out) {
                Ok(n) => return Ok(n),
                Err(e) if is_wakeup(e.kind()) => continue,
                Err(e) => return Err(SyncError::connection(e)),
            }
        }
    }
}

fn is_wakeup(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Holds a [`FramedStream`] in raw mode.
///
/// Frame mode is restored when the guard is dropped, including on early
/// return through `?`.
#[derive(Debug)]
pub struct RawGuard<'a, S> {
    framed: &'a mut FramedStream<S>,
}

impl<S> Deref for RawGuard<'_, S> {
    type Target = FramedStream<S>;

    fn deref(&self) -> &Self::Target {
        self.framed
    }
}

impl<S> DerefMut for RawGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.framed
    }
}

impl<S> Drop for RawGuard<'_, S> {
    fn drop(&mut self) {
        self.framed.mode = Expecting::Frame;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use std::collections::VecDeque;
    use std::io;

    /// An in-memory peer: reads come from scripted chunks, writes are
    /// captured.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedStream {
        pub(crate) chunks: VecDeque<Vec<u8>>,
        pub(crate) written: Vec<u8>,
        pub(crate) stall: bool,
        pub(crate) write_limit: Option<usize>,
    }

    impl ScriptedStream {
        pub(crate) fn with_chunks<I, B>(chunks: I) -> Self
        where
            I: IntoIterator<Item = B>,
            B: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
                ..Self::default()
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let Some(mut chunk) = self.chunks.pop_front() else {
                if self.stall {
                    return Err(io::Error::new(ErrorKind::WouldBlock, "no data yet"));
                }
                return Ok(0);
            };
            let n = chunk.len().min(out.len());
            out[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.chunks.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            let n = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
            self.written.extend_from_slice(&data[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn frames_split_across_reads() {
        let stream = ScriptedStream::with_chunks(["{\"ID\":", "4}\n{\"ID\"", ":5}\r\n"]);
        let mut framed = FramedStream::new(stream);

        let first = framed.next_frame().unwrap();
        assert_eq!(first.get("ID"), Some(&Value::Integer(4)));
        let second = framed.next_frame().unwrap();
        assert_eq!(second.get("ID"), Some(&Value::Integer(5)));
    }

    #[test]
    fn two_frames_in_one_read() {
        let stream = ScriptedStream::with_chunks(["{\"ID\":1}\n{\"ID\":2}\n"]);
        let mut framed = FramedStream::new(stream);

        assert_eq!(framed.next_frame().unwrap().get("ID"), Some(&Value::Integer(1)));
        assert_eq!(framed.buffered(), 9);
        assert_eq!(framed.next_frame().unwrap().get("ID"), Some(&Value::Integer(2)));
    }

    #[test]
    fn raw_read_drains_buffer_first() {
        let stream = ScriptedStream::with_chunks([b"{}\nRAW".to_vec(), b"BYTES".to_vec()]);
        let mut framed = FramedStream::new(stream);
        framed.next_frame().unwrap();

        let mut out = [0u8; 8];
        {
            let mut raw = framed.begin_raw();
            raw.read_raw_exact(&mut out).unwrap();
        }
        assert_eq!(&out, b"RAWBYTES");
        assert_eq!(framed.mode(), Expecting::Frame);
    }

    #[test]
    fn mode_misuse_is_a_protocol_error() {
        let stream = ScriptedStream::with_chunks(["{}\n"]);
        let mut framed = FramedStream::new(stream);

        let mut out = [0u8; 1];
        assert!(matches!(
            framed.read_raw_exact(&mut out),
            Err(SyncError::Protocol(_))
        ));
        assert!(matches!(framed.write_raw(b"x"), Err(SyncError::Protocol(_))));

        let mut raw = framed.begin_raw();
        assert!(matches!(raw.next_frame(), Err(SyncError::Protocol(_))));
        assert!(matches!(raw.write_frame("{}"), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn guard_restores_frame_mode_on_error() {
        let stream = ScriptedStream::with_chunks(["ab"]);
        let mut framed = FramedStream::new(stream);

        let result = (|| {
            let mut raw = framed.begin_raw();
            let mut out = [0u8; 4];
            raw.read_raw_exact(&mut out)
        })();

        assert!(matches!(result, Err(SyncError::Connection(_))));
        assert_eq!(framed.mode(), Expecting::Frame);
    }

    #[test]
    fn eof_mid_frame_is_connection_error() {
        let stream = ScriptedStream::with_chunks(["{\"ID\":"]);
        let mut framed = FramedStream::new(stream);
        let err = framed.next_frame().unwrap_err();
        assert!(matches!(err, SyncError::Connection(ref m) if m.contains("middle")));
    }

    #[test]
    fn eof_between_frames_is_connection_error() {
        let mut framed = FramedStream::new(ScriptedStream::default());
        assert!(matches!(framed.next_frame(), Err(SyncError::Connection(_))));
    }

    #[test]
    fn unterminated_oversized_frame_is_protocol_error() {
        let filler = vec![b'a'; READ_CHUNK];
        let mut chunks: Vec<Vec<u8>> = vec![filler; MAX_FRAME_LEN / READ_CHUNK + 2];
        chunks.push(b"\n".to_vec());
        let mut framed = FramedStream::new(ScriptedStream::with_chunks(chunks));

        let err = framed.next_frame().unwrap_err();
        assert!(matches!(err, SyncError::Protocol(ref m) if m.contains("line terminator")));
        // Gave up before the terminator arrived.
        assert!(framed.get_ref().chunks.contains(&b"\n".to_vec()));
    }

    #[test]
    fn malformed_frame_is_protocol_error() {
        let stream = ScriptedStream::with_chunks(["{not json\n"]);
        let mut framed = FramedStream::new(stream);
        assert!(matches!(framed.next_frame(), Err(SyncError::Protocol(_))));
    }

    #[test]
    fn write_frame_appends_terminator_after_short_writes() {
        let mut stream = ScriptedStream::default();
        stream.write_limit = Some(3);
        let mut framed = FramedStream::new(stream);

        framed.write_frame("{\"ACTION\":\"PULL\"}").unwrap();
        assert_eq!(framed.get_ref().written, b"{\"ACTION\":\"PULL\"}\n");
    }

    #[test]
    fn zero_byte_write_is_connection_error() {
        let mut stream = ScriptedStream::default();
        stream.write_limit = Some(0);
        let mut framed = FramedStream::new(stream);

        assert!(matches!(
            framed.write_frame("{}"),
            Err(SyncError::Connection(_))
        ));
    }

    #[test]
    fn stalled_read_observes_cancellation() {
        let mut stream = ScriptedStream::default();
        stream.stall = true;
        let token = CancelToken::new();
        token.cancel();

        let mut framed = FramedStream::new(stream).with_interrupt(Interrupt::new(token));
        assert!(matches!(framed.next_frame(), Err(SyncError::Cancelled)));
    }

    #[test]
    fn stalled_read_observes_deadline() {
        let mut stream = ScriptedStream::default();
        stream.stall = true;
        let interrupt =
            Interrupt::new(CancelToken::new()).with_timeout(std::time::Duration::from_millis(20));

        let mut framed = FramedStream::new(stream).with_interrupt(interrupt);
        assert!(matches!(framed.next_frame(), Err(SyncError::Timeout)));
    }
}
