//! Per-chunk fetch with resume-from-position retries.

use tokio_util::sync::CancellationToken;

use super::FetchContext;
use crate::chunker::Chunk;
use crate::retry::{classify, wait_before_retry, ChunkError, RetryDecision};
use crate::transport::{Flow, RangeRequest};

/// Bring `chunk` to completion. Blocking; run on `spawn_blocking`.
///
/// Each attempt requests `[start + position, end]` and appends what arrives, so a retry
/// never re-requests bytes already stored. Sources without range support (and
/// open-ended chunks) restart from zero instead.
pub(crate) fn fetch_chunk(
    index: usize,
    chunk: &mut Chunk,
    ctx: &FetchContext,
    cancel: &CancellationToken,
) -> Result<(), ChunkError> {
    if cancel.is_cancelled() {
        return Err(ChunkError::Cancelled);
    }
    if chunk.is_complete() {
        tracing::trace!(chunk = index, "chunk already complete");
        return Ok(());
    }

    let _active = ctx.progress.activate();
    let mut retries = 0u32;
    loop {
        let result = attempt(index, chunk, ctx, cancel);
        let err = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }

        let kind = classify(&err);
        match ctx.retry.decide(retries, kind) {
            RetryDecision::NoRetry => {
                tracing::warn!(chunk = index, error = %err, ?kind, retries, "chunk failed");
                return Err(err);
            }
            RetryDecision::RetryAfter(delay) => {
                retries += 1;
                chunk.failover_count += 1;
                tracing::debug!(
                    chunk = index,
                    error = %err,
                    ?kind,
                    attempt = retries,
                    position = chunk.position,
                    "retrying chunk"
                );
                if !wait_before_retry(delay, cancel) {
                    return Err(ChunkError::Cancelled);
                }
            }
        }
    }
}

fn attempt(
    index: usize,
    chunk: &mut Chunk,
    ctx: &FetchContext,
    cancel: &CancellationToken,
) -> Result<(), ChunkError> {
    let resumable = ctx.range_supported && !chunk.is_open_ended();
    if !resumable && chunk.position > 0 {
        tracing::debug!(chunk = index, position = chunk.position, "restarting chunk from zero");
        ctx.progress.rewind(chunk.position);
        chunk.clear()?;
    }

    let request = RangeRequest {
        address: &ctx.address,
        start: chunk.next_offset(),
        end: chunk.end,
        ranged: ctx.range_supported,
        block_size: ctx.block_size,
        cancel,
    };
    let chunk_total = chunk.length();

    ctx.transport.read_range(&request, &mut |block: &[u8]| {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        let stored = chunk.write_block(block)?;
        if stored > 0 {
            ctx.progress
                .chunk_progress(index, stored as u64, chunk.position, chunk_total);
        }
        if chunk.is_complete() {
            Ok(Flow::Done)
        } else {
            Ok(Flow::Continue)
        }
    })?;

    match chunk.remaining() {
        Some(0) | None => Ok(()),
        Some(_) => Err(ChunkError::PartialTransfer {
            expected: chunk.length(),
            received: chunk.position,
        }),
    }
}
