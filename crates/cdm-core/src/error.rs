//! Terminal errors of a download run.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::retry::ChunkError;

/// Why a run did not produce a merged result.
///
/// `Busy` is returned synchronously by the `start*` calls; everything else reaches the
/// caller through the `Completed` event.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download cancelled")]
    Cancelled,

    #[error("a download is already in progress on this service")]
    Busy,

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("invalid destination {}: {reason}", path.display())]
    InvalidDestination { path: PathBuf, reason: String },

    #[error(
        "insufficient storage at {}: {required} bytes required, {available} available",
        path.display()
    )]
    InsufficientStorage {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("metadata request failed: {0}")]
    Resolve(#[source] ChunkError),

    #[error("chunk {index} failed: {source}")]
    Chunk {
        index: usize,
        #[source]
        source: ChunkError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled)
    }

    /// Promote a chunk failure, keeping cancellation as its own variant.
    pub(crate) fn from_chunk(index: usize, source: ChunkError) -> Self {
        match source {
            ChunkError::Cancelled => DownloadError::Cancelled,
            source => DownloadError::Chunk { index, source },
        }
    }
}
