//! End-of-run handling of chunk storage.

use std::sync::{Arc, Mutex};

use super::RunTicket;
use crate::chunker::Chunk;
use crate::config::DownloadConfig;
use crate::package::Package;

/// Keep or discard chunk storage once a run is over.
///
/// Unsaved packages keep their chunks (flushed, for a later resume) when the run was
/// cancelled or the config does not ask to clear on failure. Everything else, including
/// a completed save, clears them.
pub(super) fn keep_chunks(package: &Package, cancelled: bool, cfg: &DownloadConfig) -> bool {
    !package.is_save_complete && (cancelled || !cfg.clear_package_on_completion_with_failure)
}

/// Flush or clear the package's chunks. Skipped when a newer run owns the package.
pub(super) async fn finalize(
    package: Arc<Mutex<Package>>,
    ticket: RunTicket,
    cancelled: bool,
    cfg: &DownloadConfig,
) {
    let cfg = cfg.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let mut package = package.lock().unwrap_or_else(|e| e.into_inner());
        if !ticket.is_current() {
            ("skip", Ok(()))
        } else if keep_chunks(&package, cancelled, &cfg) {
            ("flush", package.flush())
        } else {
            ("clear", package.clear())
        }
    })
    .await;

    match joined {
        Ok((action, Ok(()))) => tracing::debug!(action, "package finalized"),
        Ok((action, Err(e))) => tracing::warn!(action, error = %e, "package finalization failed"),
        Err(e) => tracing::warn!(error = %e, "package finalization task failed"),
    }
    tokio::task::yield_now().await;
}

/// Chunks of a superseded run: flush them so their data stays on disk for whoever
/// still holds a snapshot of the package.
pub(super) async fn release_orphaned(mut chunks: Vec<Chunk>) {
    let joined = tokio::task::spawn_blocking(move || {
        chunks.iter_mut().try_for_each(Chunk::flush)
    })
    .await;
    match joined {
        Ok(Ok(())) => tracing::debug!("superseded run flushed its chunks"),
        Ok(Err(e)) => tracing::warn!(error = %e, "flushing superseded chunks failed"),
        Err(e) => tracing::warn!(error = %e, "flush task failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn current_ticket() -> RunTicket {
        RunTicket {
            runs: Arc::default(),
            id: 0,
        }
    }

    fn cfg(clear_on_failure: bool) -> DownloadConfig {
        DownloadConfig {
            clear_package_on_completion_with_failure: clear_on_failure,
            ..Default::default()
        }
    }

    #[test]
    fn finalize_decision_table() {
        let saved = Package {
            is_save_complete: true,
            ..Default::default()
        };
        let unsaved = Package::default();

        // Completed saves always clear.
        assert!(!keep_chunks(&saved, false, &cfg(false)));
        assert!(!keep_chunks(&saved, true, &cfg(true)));
        // Cancelled runs keep their chunks regardless of the policy.
        assert!(keep_chunks(&unsaved, true, &cfg(false)));
        assert!(keep_chunks(&unsaved, true, &cfg(true)));
        // Failures follow the policy.
        assert!(keep_chunks(&unsaved, false, &cfg(false)));
        assert!(!keep_chunks(&unsaved, false, &cfg(true)));
    }

    #[tokio::test]
    async fn finalize_clears_failed_package_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let kind = crate::storage::StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".into(),
        };
        let mut package = Package::new("http://example.test/");
        package.chunks = Some(crate::chunker::partition(100, 2, 0, &kind).unwrap());
        package.chunks.as_mut().unwrap()[0].write_block(&[1u8; 10]).unwrap();
        let package = Arc::new(Mutex::new(package));

        finalize(Arc::clone(&package), current_ticket(), false, &cfg(false)).await;
        assert_eq!(package.lock().unwrap().received_bytes(), 10);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        finalize(Arc::clone(&package), current_ticket(), false, &cfg(true)).await;
        assert_eq!(package.lock().unwrap().received_bytes(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn finalize_leaves_package_of_newer_run_alone() {
        let mut package = Package::new("http://example.test/");
        package.chunks = Some(
            crate::chunker::partition(100, 1, 0, &crate::storage::StorageKind::Memory).unwrap(),
        );
        package.chunks.as_mut().unwrap()[0].write_block(&[1u8; 10]).unwrap();
        let package = Arc::new(Mutex::new(package));

        let stale = current_ticket();
        stale.runs.lock().unwrap().latest += 1;
        finalize(Arc::clone(&package), stale, false, &cfg(true)).await;
        assert_eq!(package.lock().unwrap().received_bytes(), 10);
    }
}
