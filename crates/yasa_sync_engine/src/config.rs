//! Configuration for the sync engine.

use std::path::PathBuf;
use std::time::Duration;

/// Address the client connects to unless told otherwise.
pub const DEFAULT_SERVER_ADDR: &str = "localhost:7454";

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server address, `host:port`.
    pub server_addr: String,
    /// Directory for in-flight pulled files.
    pub temp_dir: PathBuf,
    /// How often a blocked read wakes to check for cancellation.
    ///
    /// `None` blocks until data arrives.
    pub poll_interval: Option<Duration>,
    /// Upper bound on a whole sync cycle.
    pub timeout: Option<Duration>,
    /// Upper bound on establishing the connection.
    pub connect_timeout: Option<Duration>,
}

impl SyncConfig {
    /// Creates a configuration for the given server.
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            temp_dir: std::env::temp_dir(),
            poll_interval: None,
            timeout: None,
            connect_timeout: None,
        }
    }

    /// Sets the directory for in-flight pulled files.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Sets the poll interval for blocked reads.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Sets the cycle timeout.
    ///
    /// A timeout implies polling; if no poll interval is set, one is
    /// derived from the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// The poll interval actually applied to the socket.
    pub fn effective_poll_interval(&self) -> Option<Duration> {
        match (self.poll_interval, self.timeout) {
            (Some(interval), _) => Some(interval),
            (None, Some(timeout)) => Some((timeout / 10).clamp(
                Duration::from_millis(10),
                Duration::from_millis(500),
            )),
            (None, None) => None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_ADDR)
    }
}
