//! Download notifications and observer plumbing.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc::UnboundedSender;

use crate::error::DownloadError;
pub use crate::package::PackageStatus;

#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// Metadata resolved; emitted before options are normalized.
    Started {
        file_name: Option<PathBuf>,
        total_size: u64,
    },
    /// One block stored for one chunk.
    ChunkProgress {
        chunk_index: usize,
        progressed_bytes: u64,
        received_bytes: u64,
        total_bytes: u64,
    },
    /// Aggregate progress across all chunks, emitted after every `ChunkProgress`.
    Progress {
        progressed_bytes: u64,
        received_bytes: u64,
        total_bytes: u64,
        bytes_per_second: f64,
        average_bytes_per_second: f64,
        active_chunks: usize,
    },
    /// Terminal event of a run. `error` is `None` on success.
    Completed {
        error: Option<Arc<DownloadError>>,
        cancelled: bool,
        package: PackageStatus,
    },
}

impl DownloadEvent {
    /// Percentage for progress events with a known total.
    pub fn progress_percentage(&self) -> Option<f64> {
        let (received, total) = match self {
            DownloadEvent::ChunkProgress {
                received_bytes,
                total_bytes,
                ..
            }
            | DownloadEvent::Progress {
                received_bytes,
                total_bytes,
                ..
            } => (*received_bytes, *total_bytes),
            _ => return None,
        };
        if total == 0 {
            return None;
        }
        Some(received as f64 * 100.0 / total as f64)
    }
}

/// Receives download events. Called synchronously from the run, possibly from several
/// chunk threads at once, so implementations must be quick and must not block.
///
/// `Completed` arrives while the run still owns the service: `is_busy()` is true inside
/// the handler and chunk storage has not been flushed or cleared yet. The service is
/// idle once the `start*` call returns.
pub trait DownloadObserver: Send + Sync {
    fn notify(&self, event: &DownloadEvent);
}

impl<F> DownloadObserver for F
where
    F: Fn(&DownloadEvent) + Send + Sync,
{
    fn notify(&self, event: &DownloadEvent) {
        self(event)
    }
}

/// Forwards events into a tokio channel for consumers running on their own task.
#[derive(Debug, Clone)]
pub struct ChannelObserver(pub UnboundedSender<DownloadEvent>);

impl DownloadObserver for ChannelObserver {
    fn notify(&self, event: &DownloadEvent) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.0.send(event.clone());
    }
}

/// Shared, growable list of observers. Cloned into each run so late subscribers
/// still see the events of a run in progress.
#[derive(Clone, Default)]
pub(crate) struct Observers(Arc<RwLock<Vec<Arc<dyn DownloadObserver>>>>);

impl Observers {
    pub(crate) fn push(&self, observer: Arc<dyn DownloadObserver>) {
        self.0
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    /// Deliver `event` to every observer. The list is snapshotted first so an observer
    /// may subscribe from inside its callback.
    pub(crate) fn emit(&self, event: &DownloadEvent) {
        let snapshot: Vec<_> = self
            .0
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in snapshot {
            observer.notify(event);
        }
    }
}
