//! Shared plumbing for commands that run a download: progress output, Ctrl-C
//! cancellation, and the package snapshot written when a run does not finish.

use anyhow::Result;
use cdm_core::{ChannelObserver, DownloadError, DownloadEvent, DownloadService, Package};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// How the run ended, as reported by its `Completed` event.
struct Outcome {
    cancelled: bool,
    error: Option<Arc<DownloadError>>,
}

pub(super) struct Session {
    service: DownloadService,
    printer: JoinHandle<Option<Outcome>>,
    interrupt: JoinHandle<()>,
}

impl Session {
    pub fn new(service: DownloadService) -> Self {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        service.subscribe(ChannelObserver(tx));
        let printer = tokio::spawn(print_progress(rx));

        let handle = service.cancel_handle();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\ninterrupted, cancelling...");
                handle.cancel();
            }
        });

        Self {
            service,
            printer,
            interrupt,
        }
    }

    pub fn service(&self) -> &DownloadService {
        &self.service
    }

    /// Report the outcome. An unfinished run with data leaves a snapshot at `snapshot`
    /// (or next to the destination); a finished one removes `snapshot`.
    pub async fn finish(self, snapshot: Option<&Path>) -> Result<()> {
        self.interrupt.abort();
        let outcome = self
            .printer
            .await?
            .ok_or_else(|| anyhow::anyhow!("download ended without a completion event"))?;
        let package = self.service.take_package();

        let error = match outcome.error {
            None => {
                if let Some(file) = &package.file_name {
                    println!("Saved {}", file.display());
                }
                if let Some(path) = snapshot {
                    match std::fs::remove_file(path) {
                        Ok(()) => tracing::debug!(path = %path.display(), "package snapshot removed"),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove package snapshot"),
                    }
                }
                return Ok(());
            }
            Some(e) => e,
        };

        if package.chunks.is_some() && package.received_bytes() > 0 {
            let target = snapshot.map(Path::to_path_buf).or_else(|| snapshot_path(&package));
            if let Some(target) = target {
                package.save(&target)?;
                tracing::info!(path = %target.display(), "package snapshot saved");
                println!("Resume with: cdm resume {}", target.display());
            }
        }
        if outcome.cancelled {
            anyhow::bail!("download cancelled");
        }
        anyhow::bail!("{}", error)
    }
}

/// `<destination>.cdm.json`, when the package has a destination.
pub(crate) fn snapshot_path(package: &Package) -> Option<PathBuf> {
    let file = package.file_name.as_ref()?;
    let mut name = file.as_os_str().to_os_string();
    name.push(".cdm.json");
    Some(PathBuf::from(name))
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1_048_576.0
}

async fn print_progress(mut rx: UnboundedReceiver<DownloadEvent>) -> Option<Outcome> {
    let mut last_print: Option<Instant> = None;
    while let Some(event) = rx.recv().await {
        match &event {
            DownloadEvent::Started {
                file_name,
                total_size,
            } => {
                let name = file_name
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "memory".to_string());
                if *total_size > 0 {
                    println!("Downloading to {} ({:.1} MiB)", name, mib(*total_size));
                } else {
                    println!("Downloading to {} (size unknown)", name);
                }
            }
            DownloadEvent::Progress {
                received_bytes,
                total_bytes,
                bytes_per_second,
                active_chunks,
                ..
            } => {
                let now = Instant::now();
                let due = last_print.map_or(true, |t| now.duration_since(t) >= PROGRESS_INTERVAL);
                if due || received_bytes >= total_bytes {
                    let pct = event
                        .progress_percentage()
                        .map(|p| format!("{:.1}%", p))
                        .unwrap_or_else(|| "?".to_string());
                    print!(
                        "\r  {:.1} / {:.1} MiB ({})  {:.2} MiB/s  {} active  ",
                        mib(*received_bytes),
                        mib(*total_bytes),
                        pct,
                        bytes_per_second / 1_048_576.0,
                        active_chunks
                    );
                    let _ = std::io::stdout().flush();
                    last_print = Some(now);
                }
            }
            DownloadEvent::Completed {
                error, cancelled, ..
            } => {
                println!();
                return Some(Outcome {
                    cancelled: *cancelled,
                    error: error.clone(),
                });
            }
            DownloadEvent::ChunkProgress { .. } => {}
        }
    }
    None
}
