//! One run of the orchestrator.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;
use std::sync::{Arc, MutexGuard};
use tokio_util::sync::CancellationToken;

use super::{finish, options, Destination, DownloadService, RunTicket};
use crate::chunker::{self, Chunk};
use crate::config::DownloadConfig;
use crate::downloader::progress::ProgressReporter;
use crate::downloader::{download_parallel, download_serial, FetchContext};
use crate::error::DownloadError;
use crate::events::DownloadEvent;
use crate::package::Package;
use crate::retry::{ChunkError, RetryPolicy};
use crate::storage::StorageKind;
use crate::transport::ResourceInfo;
use crate::url_model;

fn checkpoint(token: &CancellationToken) -> Result<(), DownloadError> {
    if token.is_cancelled() {
        Err(DownloadError::Cancelled)
    } else {
        Ok(())
    }
}

impl DownloadService {
    /// Run the package currently held by the service to the end and finalize it.
    pub(super) async fn execute(
        &self,
        ticket: &RunTicket,
        destination: Destination,
    ) -> Option<Vec<u8>> {
        let token = self.cancel.begin_run();
        self.bandwidth
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .reset();
        let mut cfg = self.config.clone();
        let address = self.lock_package().address.clone();
        tracing::info!(address = %address, "download started");

        let outcome = self.run(ticket, &address, destination, &mut cfg, &token).await;

        let cancelled = token.is_cancelled();
        let (result, error) = match outcome {
            Ok(bytes) => (bytes, None),
            Err(_) if cancelled => (None, Some(DownloadError::Cancelled)),
            Err(e) => (None, Some(e)),
        };
        let cancelled = error.as_ref().map_or(false, DownloadError::is_cancelled);
        match &error {
            None => tracing::info!(address = %address, "download completed"),
            Some(e) if cancelled => tracing::info!(address = %address, "{}", e),
            Some(e) => tracing::warn!(address = %address, error = %e, "download failed"),
        }

        let status = match self.run_package(ticket) {
            Ok(package) => package.status(),
            Err(_) => Package::new(address.as_str()).status(),
        };
        self.observers.emit(&DownloadEvent::Completed {
            error: error.map(Arc::new),
            cancelled,
            package: status,
        });

        finish::finalize(Arc::clone(&self.package), ticket.clone(), cancelled, &cfg).await;
        result
    }

    /// The package, as long as this run has not been superseded by a newer one.
    fn run_package(&self, ticket: &RunTicket) -> Result<MutexGuard<'_, Package>, DownloadError> {
        let package = self.lock_package();
        if ticket.is_current() {
            Ok(package)
        } else {
            tracing::debug!("run superseded, leaving the package alone");
            Err(DownloadError::Cancelled)
        }
    }

    /// Hand chunks back to the package. A superseded run keeps its chunk data on disk
    /// instead.
    async fn return_chunks(
        &self,
        ticket: &RunTicket,
        chunks: Vec<Chunk>,
        save_progress: Option<f64>,
    ) -> Result<(), DownloadError> {
        let superseded = match self.run_package(ticket) {
            Ok(mut package) => {
                package.chunks = Some(chunks);
                if let Some(progress) = save_progress {
                    package.save_progress = progress;
                    package.is_saving = false;
                }
                return Ok(());
            }
            Err(e) => e,
        };
        finish::release_orphaned(chunks).await;
        Err(superseded)
    }

    async fn run(
        &self,
        ticket: &RunTicket,
        address: &str,
        destination: Destination,
        cfg: &mut DownloadConfig,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, DownloadError> {
        checkpoint(token)?;
        let info = self.resolve(address, token).await?;

        let (file_name, total_size) = {
            let mut package = self.run_package(ticket)?;
            package.total_size = info.total_size;
            package.range_supported = info.range_supported;
            package.is_save_complete = false;
            match destination {
                Destination::Memory => package.file_name = None,
                Destination::File(path) => package.file_name = Some(path),
                Destination::Directory(dir) => {
                    package.file_name = Some(url_model::destination_in(
                        &dir,
                        info.suggested_filename.as_deref(),
                        address,
                    ))
                }
                Destination::Package => {}
            }
            (package.file_name.clone(), package.total_size)
        };
        self.observers.emit(&DownloadEvent::Started {
            file_name,
            total_size,
        });
        checkpoint(token)?;

        let (chunks, total_size, range_supported) = {
            let mut package = self.run_package(ticket)?;
            options::normalize(cfg, &mut package)?;
            let total = package.total_size;
            let low = options::range_low(cfg);
            if package.chunks.is_none() {
                package.chunks = Some(chunker::partition(
                    total,
                    cfg.chunk_count,
                    low,
                    &StorageKind::from_config(cfg),
                )?);
            }
            package.validate(total, low)?;
            // Still holding the chunks in the package, so bailing out here loses nothing.
            checkpoint(token)?;
            package.is_saving = true;
            (
                package.chunks.take().unwrap_or_default(),
                total,
                package.range_supported,
            )
        };
        let received: u64 = chunks.iter().map(|c| c.position).sum();

        let progress = Arc::new(ProgressReporter::with_bandwidth(
            self.observers.clone(),
            Arc::clone(&self.bandwidth),
            total_size,
            received,
        ));
        let ctx = Arc::new(FetchContext {
            address: address.to_string(),
            transport: Arc::clone(&self.transport),
            range_supported,
            block_size: cfg.buffer_block_size.max(1),
            retry: RetryPolicy::new(cfg.max_try_again_on_failover, cfg.retry_delay()),
            storage: StorageKind::from_config(cfg),
            progress: Arc::clone(&progress),
        });
        tracing::debug!(
            chunks = chunks.len(),
            parallel = cfg.parallel_download,
            received,
            "dispatching chunks"
        );

        let (chunks, dispatched) = if cfg.parallel_download {
            download_parallel(chunks, ctx, cfg.effective_parallel_count(), token.clone()).await
        } else {
            download_serial(chunks, ctx, token.clone()).await
        };
        self.return_chunks(ticket, chunks, Some(progress.save_progress()))
            .await?;
        dispatched?;
        checkpoint(token)?;

        let merged = self.store(ticket, token).await?;
        let mut package = self.run_package(ticket)?;
        package.is_save_complete = true;
        if package.total_size > 0 {
            package.save_progress = 100.0;
        }
        Ok(merged)
    }

    /// Metadata lookup on the blocking pool; a cancel stops waiting for it.
    async fn resolve(
        &self,
        address: &str,
        token: &CancellationToken,
    ) -> Result<ResourceInfo, DownloadError> {
        let transport = Arc::clone(&self.transport);
        let owned = address.to_string();
        let lookup = tokio::task::spawn_blocking(move || transport.resolve(&owned));
        tokio::select! {
            _ = token.cancelled() => Err(DownloadError::Cancelled),
            joined = lookup => match joined {
                Ok(Ok(info)) => Ok(info),
                Ok(Err(ChunkError::Cancelled)) => Err(DownloadError::Cancelled),
                Ok(Err(e)) => Err(DownloadError::Resolve(e)),
                Err(e) => Err(DownloadError::Internal(format!("resolve task: {}", e))),
            },
        }
    }

    /// Merge the package's chunks into its destination in ascending offset order.
    async fn store(
        &self,
        ticket: &RunTicket,
        token: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, DownloadError> {
        let (chunks, file_name) = {
            let mut package = self.run_package(ticket)?;
            (package.chunks.take().unwrap_or_default(), package.file_name.clone())
        };
        let cancel = token.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let result = merge_into(&chunks, file_name.as_deref(), &cancel);
            (chunks, result)
        })
        .await;
        match joined {
            Ok((chunks, result)) => {
                self.return_chunks(ticket, chunks, None).await?;
                result
            }
            Err(e) => Err(DownloadError::Internal(format!("merge task: {}", e))),
        }
    }
}

fn merge_into(
    chunks: &[Chunk],
    file_name: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, DownloadError> {
    let promote = |e: ChunkError| match e {
        ChunkError::Cancelled => DownloadError::Cancelled,
        ChunkError::Storage(io) => DownloadError::Storage(io),
        other => DownloadError::Internal(other.to_string()),
    };
    match file_name {
        None => {
            let mut out = Vec::new();
            chunker::merge_chunks(chunks, &mut out, cancel).map_err(promote)?;
            Ok(Some(out))
        }
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut out = BufWriter::new(File::create(path)?);
            let written = chunker::merge_chunks(chunks, &mut out, cancel).map_err(promote)?;
            tracing::debug!(path = %path.display(), bytes = written, "destination written");
            Ok(None)
        }
    }
}
