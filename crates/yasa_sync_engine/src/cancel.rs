//! Cancellation and deadlines for blocking I/O.

use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A shareable cancellation flag.
///
/// Clones observe the same flag, so one can be handed to another thread
/// (or a signal handler) while the engine holds the other.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Clears a previous request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// What a blocked read consults when it wakes up.
#[derive(Debug, Clone, Default)]
pub struct Interrupt {
    token: CancelToken,
    deadline: Option<Instant>,
}

impl Interrupt {
    /// Creates an interrupt with no deadline.
    pub fn new(token: CancelToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Adds a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Adds an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Fails with `Cancelled` or `Timeout` if either has fired.
    pub fn check(&self) -> SyncResult<()> {
        if self.token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SyncError::Timeout),
            _ => Ok(()),
        }
    }
}
