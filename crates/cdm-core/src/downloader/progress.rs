//! Aggregate progress for one run: received bytes, bandwidth, active chunk count.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bandwidth::Bandwidth;
use crate::events::{DownloadEvent, Observers};

/// Fed by chunk fetchers from any thread; emits `ChunkProgress` then `Progress` for
/// every stored block.
pub(crate) struct ProgressReporter {
    observers: Observers,
    total_bytes: u64,
    received: Mutex<u64>,
    /// Owned by the service so `reset()` can zero it between runs.
    bandwidth: Arc<Mutex<Bandwidth>>,
    active: AtomicUsize,
}

/// Counts a chunk as active until dropped.
pub(crate) struct ActiveChunk<'a> {
    reporter: &'a ProgressReporter,
}

impl Drop for ActiveChunk<'_> {
    fn drop(&mut self) {
        self.reporter.active.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ProgressReporter {
    /// Reporter with its own bandwidth meter.
    #[cfg(test)]
    pub(crate) fn new(observers: Observers, total_bytes: u64, already_received: u64) -> Self {
        Self::with_bandwidth(observers, Arc::default(), total_bytes, already_received)
    }

    /// `already_received` seeds the counter on resume.
    pub(crate) fn with_bandwidth(
        observers: Observers,
        bandwidth: Arc<Mutex<Bandwidth>>,
        total_bytes: u64,
        already_received: u64,
    ) -> Self {
        Self {
            observers,
            total_bytes,
            received: Mutex::new(already_received),
            bandwidth,
            active: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.received.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn activate(&self) -> ActiveChunk<'_> {
        self.active.fetch_add(1, Ordering::Relaxed);
        ActiveChunk { reporter: self }
    }

    pub(crate) fn active_chunks(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub(crate) fn received(&self) -> u64 {
        *self.lock()
    }

    /// Percentage of the total received; 0 when the total is unknown.
    pub(crate) fn save_progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.received() as f64 * 100.0 / self.total_bytes as f64
    }

    /// Forget bytes of a chunk that restarts from zero.
    pub(crate) fn rewind(&self, bytes: u64) {
        let mut received = self.lock();
        *received = received.saturating_sub(bytes);
    }

    /// Record `progressed` new bytes stored by chunk `chunk_index`.
    pub(crate) fn chunk_progress(
        &self,
        chunk_index: usize,
        progressed: u64,
        chunk_received: u64,
        chunk_total: u64,
    ) {
        let (received, speed, average) = {
            let mut received = self.lock();
            *received += progressed;
            let mut bandwidth = self.bandwidth.lock().unwrap_or_else(|e| e.into_inner());
            bandwidth.observe(progressed);
            (*received, bandwidth.speed(), bandwidth.average_speed())
        };

        self.observers.emit(&DownloadEvent::ChunkProgress {
            chunk_index,
            progressed_bytes: progressed,
            received_bytes: chunk_received,
            total_bytes: chunk_total,
        });
        self.observers.emit(&DownloadEvent::Progress {
            progressed_bytes: progressed,
            received_bytes: received,
            total_bytes: self.total_bytes,
            bytes_per_second: speed,
            average_bytes_per_second: average,
            active_chunks: self.active_chunks(),
        });
    }
}
