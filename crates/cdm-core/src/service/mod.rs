//! Download orchestrator.
//!
//! A `DownloadService` owns one package at a time and runs it through
//! resolve → started → normalize → partition/validate → dispatch → merge → completed,
//! then finalizes chunk storage. Only `Busy` is returned to the caller of `start*`;
//! every other outcome arrives as a `Completed` event.
//!
//! The service is reusable: after a run ends it is idle again and can start a new
//! download or resume the package it holds.

mod finish;
mod options;
mod run;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::bandwidth::Bandwidth;
use crate::config::DownloadConfig;
use crate::control::CancelHandle;
use crate::error::DownloadError;
use crate::events::{DownloadObserver, Observers};
use crate::package::Package;
use crate::transport::{CurlTransport, Transport};

/// Where the merged bytes go.
#[derive(Debug, Clone)]
pub(crate) enum Destination {
    /// Returned from `start` as a byte vector.
    Memory,
    File(PathBuf),
    /// File inside this directory, named from server metadata or the address.
    Directory(PathBuf),
    /// Whatever the package already names (resume).
    Package,
}

#[derive(Debug, Default)]
struct RunState {
    busy: bool,
    /// Id of the most recent run; older runs are superseded.
    latest: u64,
}

/// Identity of one run. A run stays current until a newer run starts, which only
/// happens after `reset()` released the busy flag underneath it.
#[derive(Debug, Clone)]
pub(crate) struct RunTicket {
    runs: Arc<Mutex<RunState>>,
    id: u64,
}

impl RunTicket {
    pub(crate) fn is_current(&self) -> bool {
        lock_runs(&self.runs).latest == self.id
    }
}

fn lock_runs(runs: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    runs.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the busy flag when the run ends, however it ends, unless a newer run owns it.
struct BusyGuard {
    ticket: RunTicket,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        let mut runs = lock_runs(&self.ticket.runs);
        if runs.latest == self.ticket.id {
            runs.busy = false;
        }
    }
}

pub struct DownloadService {
    config: DownloadConfig,
    transport: Arc<dyn Transport>,
    package: Arc<Mutex<Package>>,
    runs: Arc<Mutex<RunState>>,
    bandwidth: Arc<Mutex<Bandwidth>>,
    cancel: CancelHandle,
    observers: Observers,
}

impl DownloadService {
    /// Service backed by libcurl, with the speed cap split across the parallel
    /// connections.
    pub fn new(config: DownloadConfig) -> Self {
        let transport = CurlTransport::new(config.request.clone())
            .with_connection_share(config.effective_parallel_count());
        Self::with_transport(config, Arc::new(transport))
    }

    pub fn with_transport(config: DownloadConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            package: Arc::new(Mutex::new(Package::default())),
            runs: Arc::default(),
            bandwidth: Arc::default(),
            cancel: CancelHandle::new(),
            observers: Observers::default(),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Register an observer for every subsequent event, including those of a run already
    /// in progress.
    pub fn subscribe(&self, observer: impl DownloadObserver + 'static) {
        self.observers.push(Arc::new(observer));
    }

    fn enter(&self) -> Result<BusyGuard, DownloadError> {
        let mut runs = lock_runs(&self.runs);
        if runs.busy {
            return Err(DownloadError::Busy);
        }
        runs.busy = true;
        runs.latest += 1;
        Ok(BusyGuard {
            ticket: RunTicket {
                runs: Arc::clone(&self.runs),
                id: runs.latest,
            },
        })
    }

    fn lock_package(&self) -> MutexGuard<'_, Package> {
        self.package.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Download `address` into memory. `Ok(None)` when the run did not complete; the
    /// reason is in the `Completed` event.
    pub async fn start(&self, address: &str) -> Result<Option<Vec<u8>>, DownloadError> {
        let busy = self.enter()?;
        *self.lock_package() = Package::new(address);
        Ok(self.execute(&busy.ticket, Destination::Memory).await)
    }

    /// Download `address` into `path` (created or truncated at merge time).
    pub async fn start_file(&self, address: &str, path: impl AsRef<Path>) -> Result<(), DownloadError> {
        let busy = self.enter()?;
        *self.lock_package() = Package::new(address);
        self.execute(&busy.ticket, Destination::File(path.as_ref().to_path_buf()))
            .await;
        Ok(())
    }

    /// Download `address` into `dir`, naming the file from the server's
    /// `Content-Disposition`, then the address path, then a generated name.
    pub async fn start_in_directory(
        &self,
        address: &str,
        dir: impl AsRef<Path>,
    ) -> Result<(), DownloadError> {
        let busy = self.enter()?;
        *self.lock_package() = Package::new(address);
        self.execute(&busy.ticket, Destination::Directory(dir.as_ref().to_path_buf()))
            .await;
        Ok(())
    }

    /// Continue `package`, reusing its chunk sequence. Returns the merged bytes when
    /// the package has no file name.
    pub async fn resume(&self, package: Package) -> Result<Option<Vec<u8>>, DownloadError> {
        let busy = self.enter()?;
        *self.lock_package() = package;
        Ok(self.execute(&busy.ticket, Destination::Package).await)
    }

    /// Cooperatively cancel the current run. Idempotent. Issued while idle, it is
    /// honored by the next run at its first checkpoint.
    pub fn cancel(&self) {
        tracing::debug!("cancel requested");
        self.cancel.cancel();
    }

    /// Handle that cancels runs of this service from anywhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Clear transient state: pending cancellation, bandwidth counters and the busy flag.
    /// The package and its chunk data are left alone.
    ///
    /// Reset during a run lets a new run start. The old run is then superseded: it no
    /// longer touches the package and leaves its chunk data where it is.
    pub fn reset(&self) {
        self.cancel.renew();
        self.bandwidth
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        lock_runs(&self.runs).busy = false;
    }

    /// Cancel and reset. Chunk storage is never discarded here.
    pub fn dispose(&self) {
        self.cancel();
        self.reset();
    }

    pub fn is_busy(&self) -> bool {
        lock_runs(&self.runs).busy
    }

    /// True from `cancel()` until `reset()` or the next start.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The current package. Chunks are absent while a run has them checked out.
    pub fn package(&self) -> MutexGuard<'_, Package> {
        self.lock_package()
    }

    /// Take the package out, leaving an empty one (e.g. to persist it or resume it).
    pub fn take_package(&self) -> Package {
        std::mem::take(&mut *self.lock_package())
    }
}
