//! Serial and parallel chunk dispatch.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{fetch_chunk, FetchContext};
use crate::chunker::Chunk;
use crate::error::DownloadError;
use crate::storage::ChunkStorage;

type Dispatched = (Vec<Chunk>, Result<(), DownloadError>);

/// Range and temp file of a chunk handed to a task, kept in case the task panics.
struct ChunkOrigin {
    start: u64,
    end: Option<u64>,
    file: Option<PathBuf>,
}

impl ChunkOrigin {
    fn of(chunk: &Chunk) -> Self {
        Self {
            start: chunk.start,
            end: chunk.end,
            file: chunk.storage.file_path().map(|p| p.to_path_buf()),
        }
    }
}

/// Fresh chunk for the same range, used when a task panicked and took the chunk with it.
/// The lost chunk's position died with it, so its partial temp file is deleted.
fn rebuild(ctx: &FetchContext, origin: ChunkOrigin) -> Chunk {
    if let Some(path) = &origin.file {
        match std::fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "removed temp file of lost chunk"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not remove temp file of lost chunk")
            }
        }
    }
    let storage = ctx.storage.create().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not recreate chunk storage, using memory");
        ChunkStorage::default()
    });
    Chunk::new(origin.start, origin.end, storage)
}

/// Run `fetch_chunk` on the blocking pool and get the chunk back.
async fn fetch_blocking(
    index: usize,
    mut chunk: Chunk,
    ctx: Arc<FetchContext>,
    cancel: CancellationToken,
) -> (Chunk, Result<(), DownloadError>) {
    let origin = ChunkOrigin::of(&chunk);
    let task_ctx = Arc::clone(&ctx);
    let joined = tokio::task::spawn_blocking(move || {
        let result = fetch_chunk(index, &mut chunk, &task_ctx, &cancel);
        (chunk, result)
    })
    .await;
    match joined {
        Ok((chunk, result)) => (chunk, result.map_err(|e| DownloadError::from_chunk(index, e))),
        Err(e) => (
            rebuild(&ctx, origin),
            Err(DownloadError::Internal(format!("chunk {} task: {}", index, e))),
        ),
    }
}

/// Keeps the most informative error: a real failure beats a cancellation caused by it.
fn record(slot: &mut Option<DownloadError>, err: DownloadError) {
    match slot {
        None => *slot = Some(err),
        Some(existing) if existing.is_cancelled() && !err.is_cancelled() => *slot = Some(err),
        Some(_) => {}
    }
}

/// Fetch chunks one after another in ascending order. Stops at the first failure; later
/// chunks are returned untouched.
pub(crate) async fn download_serial(
    chunks: Vec<Chunk>,
    ctx: Arc<FetchContext>,
    cancel: CancellationToken,
) -> Dispatched {
    let mut out = Vec::with_capacity(chunks.len());
    let mut failure = None;
    for (index, chunk) in chunks.into_iter().enumerate() {
        if failure.is_some() {
            out.push(chunk);
            continue;
        }
        let (chunk, result) =
            fetch_blocking(index, chunk, Arc::clone(&ctx), cancel.clone()).await;
        out.push(chunk);
        if let Err(e) = result {
            failure = Some(e);
        }
    }
    (out, failure.map_or(Ok(()), Err))
}

/// Fetch all chunks concurrently with at most `parallel` fetches in flight. A permit is
/// taken right before a chunk's fetch and released right after it.
///
/// A non-cancellation failure cancels the sibling chunks through a child token; `cancel`
/// itself is left alone.
pub(crate) async fn download_parallel(
    chunks: Vec<Chunk>,
    ctx: Arc<FetchContext>,
    parallel: usize,
    cancel: CancellationToken,
) -> Dispatched {
    let gate = Arc::new(Semaphore::new(parallel.max(1)));
    let siblings = cancel.child_token();
    let origins: Vec<ChunkOrigin> = chunks.iter().map(ChunkOrigin::of).collect();
    let mut slots: Vec<Option<Chunk>> = chunks.iter().map(|_| None).collect();

    let mut set = JoinSet::new();
    for (index, chunk) in chunks.into_iter().enumerate() {
        let ctx = Arc::clone(&ctx);
        let gate = Arc::clone(&gate);
        let token = siblings.clone();
        set.spawn(async move {
            let permit = tokio::select! {
                _ = token.cancelled() => None,
                permit = gate.acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                return (index, chunk, Err(DownloadError::Cancelled));
            };
            let (chunk, result) = fetch_blocking(index, chunk, ctx, token).await;
            drop(permit);
            (index, chunk, result)
        });
    }

    let mut failure = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, chunk, result)) => {
                slots[index] = Some(chunk);
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        tracing::debug!(chunk = index, error = %e, "stopping sibling chunks");
                        siblings.cancel();
                    }
                    record(&mut failure, e);
                }
            }
            Err(e) => {
                siblings.cancel();
                record(&mut failure, DownloadError::Internal(format!("chunk task: {}", e)));
            }
        }
    }

    let chunks = slots
        .into_iter()
        .zip(origins)
        .map(|(slot, origin)| slot.unwrap_or_else(|| rebuild(&ctx, origin)))
        .collect();
    (chunks, failure.map_or(Ok(()), Err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{merge_chunks, partition};
    use crate::downloader::progress::ProgressReporter;
    use crate::events::Observers;
    use crate::retry::RetryPolicy;
    use crate::storage::StorageKind;
    use crate::transport::testing::StaticTransport;
    use std::time::Duration;

    fn body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    fn ctx(transport: StaticTransport) -> Arc<FetchContext> {
        shared_ctx(Arc::new(transport))
    }

    fn shared_ctx(transport: Arc<StaticTransport>) -> Arc<FetchContext> {
        let total = transport.body.len() as u64;
        Arc::new(FetchContext {
            address: "http://example.test/file.bin".into(),
            transport,
            range_supported: true,
            block_size: 128,
            retry: RetryPolicy::new(0, Duration::ZERO),
            storage: StorageKind::Memory,
            progress: Arc::new(ProgressReporter::new(Observers::default(), total, 0)),
        })
    }

    fn merged(chunks: &[Chunk]) -> Vec<u8> {
        let mut out = Vec::new();
        merge_chunks(chunks, &mut out, &CancellationToken::new()).unwrap();
        out
    }

    #[tokio::test]
    async fn parallel_downloads_every_chunk() {
        let src = body(10_000);
        let ctx = ctx(StaticTransport::new(src.clone()));
        let chunks = partition(10_000, 8, 0, &StorageKind::Memory).unwrap();
        let (chunks, result) =
            download_parallel(chunks, Arc::clone(&ctx), 3, CancellationToken::new()).await;
        result.unwrap();
        assert_eq!(chunks.len(), 8);
        assert_eq!(merged(&chunks), src);
        assert_eq!(ctx.progress.active_chunks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_fetches_never_exceed_the_cap() {
        let src = body(16 * 500);
        let transport = Arc::new(StaticTransport {
            read_delay: Some(Duration::from_millis(20)),
            ..StaticTransport::new(src.clone())
        });
        let ctx = shared_ctx(Arc::clone(&transport));
        let chunks = partition(src.len() as u64, 16, 0, &StorageKind::Memory).unwrap();
        let (chunks, result) =
            download_parallel(chunks, Arc::clone(&ctx), 3, CancellationToken::new()).await;
        result.unwrap();
        assert_eq!(merged(&chunks), src);
        assert_eq!(transport.requests.lock().unwrap().len(), 16);
        let peak = transport.max_in_flight.load(std::sync::atomic::Ordering::SeqCst);
        assert!((1..=3).contains(&peak), "peak of {} concurrent fetches", peak);
        assert_eq!(transport.in_flight.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn rebuild_replaces_lost_chunk_and_removes_its_file() {
        let dir = tempfile::tempdir().unwrap();
        let kind = StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".to_string(),
        };
        let mut lost = Chunk::new(100, Some(199), kind.create().unwrap());
        lost.write_block(&[7; 40]).unwrap();
        let old = lost.storage.file_path().unwrap().to_path_buf();
        let origin = ChunkOrigin::of(&lost);
        drop(lost);

        let ctx = FetchContext {
            address: "http://example.test/file.bin".into(),
            transport: Arc::new(StaticTransport::new(body(10))),
            range_supported: true,
            block_size: 128,
            retry: RetryPolicy::new(0, Duration::ZERO),
            storage: kind,
            progress: Arc::new(ProgressReporter::new(Observers::default(), 10, 0)),
        };
        let fresh = rebuild(&ctx, origin);
        assert!(!old.exists());
        assert_eq!((fresh.start, fresh.end, fresh.position), (100, Some(199), 0));
        let new = fresh.storage.file_path().unwrap();
        assert_ne!(new, old.as_path());
        assert!(new.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn serial_downloads_in_order() {
        let src = body(4_000);
        let transport = StaticTransport::new(src.clone());
        let ctx = ctx(transport);
        let chunks = partition(4_000, 4, 0, &StorageKind::Memory).unwrap();
        let (chunks, result) =
            download_serial(chunks, Arc::clone(&ctx), CancellationToken::new()).await;
        result.unwrap();
        assert_eq!(merged(&chunks), src);
    }

    #[tokio::test]
    async fn failure_is_reported_and_chunks_returned() {
        let ctx = ctx(StaticTransport {
            fail_status: Some(403),
            ..StaticTransport::new(body(1_000))
        });
        let chunks = partition(1_000, 4, 0, &StorageKind::Memory).unwrap();
        let token = CancellationToken::new();
        let (chunks, result) = download_parallel(chunks, ctx, 2, token.clone()).await;
        assert_eq!(chunks.len(), 4);
        assert!(matches!(
            result,
            Err(DownloadError::Chunk {
                source: crate::retry::ChunkError::Http(403),
                ..
            })
        ));
        assert!(!token.is_cancelled(), "global token must stay untouched");
    }

    #[tokio::test]
    async fn cancelled_run_returns_all_chunks() {
        let ctx = ctx(StaticTransport::new(body(1_000)));
        let chunks = partition(1_000, 4, 0, &StorageKind::Memory).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let (chunks, result) = download_parallel(chunks, ctx, 2, token).await;
        assert_eq!(chunks.len(), 4);
        assert!(matches!(result, Err(DownloadError::Cancelled)));
        assert!(chunks.iter().all(|c| c.position == 0));
    }

    #[test]
    fn real_failure_outranks_cancellation() {
        let mut slot = None;
        record(&mut slot, DownloadError::Cancelled);
        record(&mut slot, DownloadError::Internal("boom".into()));
        record(&mut slot, DownloadError::Cancelled);
        assert!(matches!(slot, Some(DownloadError::Internal(_))));
    }
}
