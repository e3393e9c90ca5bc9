//! Chunk fetching and dispatch.
//!
//! `fetch_chunk` drives one chunk to completion with retries. `download_serial` and
//! `download_parallel` move chunks into blocking tasks (one owner per chunk) and hand
//! them back when the tasks end, whatever the outcome.

mod dispatch;
mod fetch;
pub(crate) mod progress;

pub(crate) use dispatch::{download_parallel, download_serial};
pub(crate) use fetch::fetch_chunk;

use std::sync::Arc;

use crate::retry::RetryPolicy;
use crate::storage::StorageKind;
use crate::transport::Transport;
use progress::ProgressReporter;

/// Everything a chunk fetch needs besides the chunk itself. Shared by all chunks of a run.
pub(crate) struct FetchContext {
    pub address: String,
    pub transport: Arc<dyn Transport>,
    pub range_supported: bool,
    pub block_size: usize,
    pub retry: RetryPolicy,
    /// Used to rebuild a chunk whose task died.
    pub storage: StorageKind,
    pub progress: Arc<ProgressReporter>,
}
