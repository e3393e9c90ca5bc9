//! Merge chunk storages into the destination in ascending offset order.

use std::io::{Read, Write};
use tokio_util::sync::CancellationToken;

use super::chunk::Chunk;
use crate::retry::ChunkError;

const COPY_BUFFER: usize = 64 * 1024;

/// Copies every chunk's stored bytes into `dest`, ordered by chunk start regardless of
/// the order the slice is in. Checks `cancel` between chunks and between copy blocks.
/// Returns the number of bytes written.
pub fn merge_chunks<W: Write>(
    chunks: &[Chunk],
    dest: &mut W,
    cancel: &CancellationToken,
) -> Result<u64, ChunkError> {
    let mut ordered: Vec<&Chunk> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.start);

    let mut buf = vec![0u8; COPY_BUFFER];
    let mut written = 0u64;
    for chunk in ordered {
        if cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        let mut reader = chunk.storage.open_read()?;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            dest.write_all(&buf[..n])?;
            written += n as u64;
            if cancel.is_cancelled() {
                return Err(ChunkError::Cancelled);
            }
        }
    }
    dest.flush()?;
    tracing::debug!(bytes = written, "merged chunks");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::partition;
    use crate::storage::StorageKind;

    fn source(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn fill(chunk: &mut Chunk, src: &[u8]) {
        let start = chunk.start as usize;
        let end = chunk.end.unwrap() as usize;
        chunk.write_block(&src[start..=end]).unwrap();
    }

    #[test]
    fn merge_order_independent_of_completion_order() {
        let src = source(10_000);
        // Completion orders to simulate: ascending, descending, interleaved.
        let orders: Vec<Vec<usize>> = vec![
            (0..7).collect(),
            (0..7).rev().collect(),
            vec![3, 0, 6, 1, 5, 2, 4],
        ];
        for order in orders {
            let mut chunks = partition(src.len() as u64, 7, 0, &StorageKind::Memory).unwrap();
            for &i in &order {
                fill(&mut chunks[i], &src);
            }
            // Hand the merger the chunks in completion order, not offset order.
            let mut by_completion: Vec<Chunk> = Vec::new();
            let mut slots: Vec<Option<Chunk>> = chunks.into_iter().map(Some).collect();
            for &i in &order {
                by_completion.push(slots[i].take().unwrap());
            }
            let mut out = Vec::new();
            let n = merge_chunks(&by_completion, &mut out, &CancellationToken::new()).unwrap();
            assert_eq!(n, src.len() as u64);
            assert_eq!(out, src);
        }
    }

    #[test]
    fn merge_from_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let kind = StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".to_string(),
        };
        let src = source(4096 + 3);
        let mut chunks = partition(src.len() as u64, 4, 0, &kind).unwrap();
        for c in chunks.iter_mut() {
            fill(c, &src);
            c.flush().unwrap();
        }
        let mut out = Vec::new();
        merge_chunks(&chunks, &mut out, &CancellationToken::new()).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn merge_stops_when_cancelled() {
        let src = source(1000);
        let mut chunks = partition(1000, 4, 0, &StorageKind::Memory).unwrap();
        for c in chunks.iter_mut() {
            fill(c, &src);
        }
        let token = CancellationToken::new();
        token.cancel();
        let mut out = Vec::new();
        let err = merge_chunks(&chunks, &mut out, &token).unwrap_err();
        assert!(err.is_cancelled());
        assert!(out.is_empty());
    }
}
