//! Chunk transfer error type for retry classification.

use std::fmt;

/// Error returned by a single chunk transfer attempt (transport, HTTP, or storage failure).
/// Kept separate from `DownloadError` so the fetcher can classify and retry before
/// promoting it to a terminal error.
#[derive(Debug)]
pub enum ChunkError {
    /// Curl reported an error (timeout, connection, DNS, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Server answered a ranged request with a body that does not start at the
    /// requested offset (e.g. 200 instead of 206). Not retried.
    RangeNotHonored { status: u32, start: u64 },
    /// Response ended before the requested range was fully received
    /// (e.g. server closed early). Retried from the current position.
    PartialTransfer { expected: u64, received: u64 },
    /// Network-level failure reported by a non-curl transport.
    Connection(String),
    /// Address could not be parsed or uses an unsupported scheme. Not retried.
    InvalidAddress(String),
    /// Chunk storage write/read failed (e.g. disk full). Not retried.
    Storage(std::io::Error),
    /// Cooperative cancellation observed mid-transfer.
    Cancelled,
}

impl ChunkError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled)
    }
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::Curl(e) => write!(f, "{}", e),
            ChunkError::Http(code) => write!(f, "HTTP {}", code),
            ChunkError::RangeNotHonored { status, start } => {
                write!(f, "HTTP {} does not honor range starting at {}", status, start)
            }
            ChunkError::PartialTransfer { expected, received } => {
                write!(f, "partial transfer: expected {} bytes, got {}", expected, received)
            }
            ChunkError::Connection(msg) => write!(f, "connection: {}", msg),
            ChunkError::InvalidAddress(addr) => write!(f, "invalid address: {}", addr),
            ChunkError::Storage(e) => write!(f, "storage: {}", e),
            ChunkError::Cancelled => write!(f, "transfer cancelled"),
        }
    }
}

impl std::error::Error for ChunkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ChunkError::Curl(e) => Some(e),
            ChunkError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(e: std::io::Error) -> Self {
        ChunkError::Storage(e)
    }
}
