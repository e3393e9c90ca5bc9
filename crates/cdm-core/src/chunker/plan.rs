//! Chunk planning: split a byte range into contiguous chunk descriptors.

use std::io;

use super::chunk::Chunk;
use crate::storage::StorageKind;

/// Inclusive byte ranges for `chunk_count` chunks covering
/// `[range_low, range_low + total_size)`.
///
/// Sizes come from integer division; the last chunk absorbs the remainder.
/// `chunk_count` is clamped to at least 1 and at most `total_size` (no empty chunks).
/// A zero (unknown) size yields one open-ended range starting at `range_low`.
pub fn plan_ranges(total_size: u64, chunk_count: usize, range_low: u64) -> Vec<(u64, Option<u64>)> {
    if total_size == 0 {
        return vec![(range_low, None)];
    }

    let count = (chunk_count.max(1) as u64).min(total_size);
    let size = total_size / count;
    let last_end = range_low + total_size - 1;

    (0..count)
        .map(|i| {
            let start = range_low + i * size;
            let end = if i == count - 1 {
                last_end
            } else {
                start + size - 1
            };
            (start, Some(end))
        })
        .collect()
}

/// Builds the chunk sequence for a download, creating one store per chunk.
pub fn partition(
    total_size: u64,
    chunk_count: usize,
    range_low: u64,
    storage: &StorageKind,
) -> io::Result<Vec<Chunk>> {
    let ranges = plan_ranges(total_size, chunk_count, range_low);
    let mut chunks = Vec::with_capacity(ranges.len());
    for (start, end) in ranges {
        chunks.push(Chunk::new(start, end, storage.create()?));
    }
    tracing::debug!(
        total_size,
        requested = chunk_count,
        planned = chunks.len(),
        range_low,
        "partitioned download"
    );
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_cover(ranges: &[(u64, Option<u64>)], low: u64, total: u64) {
        assert!(!ranges.is_empty());
        assert_eq!(ranges[0].0, low);
        let mut next = low;
        for (start, end) in ranges {
            assert_eq!(*start, next, "ranges must be contiguous");
            let end = end.expect("bounded range");
            assert!(end >= *start, "ranges must be non-empty");
            next = end + 1;
        }
        assert_eq!(next, low + total, "union must end at low + total");
    }

    #[test]
    fn even_split() {
        let r = plan_ranges(1000, 4, 0);
        assert_eq!(
            r,
            vec![(0, Some(249)), (250, Some(499)), (500, Some(749)), (750, Some(999))]
        );
    }

    #[test]
    fn remainder_goes_to_last_chunk() {
        let r = plan_ranges(10, 4, 0);
        // 10/4 -> size 2, last chunk takes 2 + 2
        assert_eq!(r, vec![(0, Some(1)), (2, Some(3)), (4, Some(5)), (6, Some(9))]);
    }

    #[test]
    fn offset_by_range_low() {
        let r = plan_ranges(100, 3, 50);
        assert_eq!(r, vec![(50, Some(82)), (83, Some(115)), (116, Some(149))]);
    }

    #[test]
    fn zero_count_clamped_to_one() {
        assert_eq!(plan_ranges(100, 0, 0), vec![(0, Some(99))]);
    }

    #[test]
    fn more_chunks_than_bytes() {
        let r = plan_ranges(3, 8, 0);
        assert_eq!(r, vec![(0, Some(0)), (1, Some(1)), (2, Some(2))]);
    }

    #[test]
    fn unknown_size_is_one_open_chunk() {
        assert_eq!(plan_ranges(0, 8, 0), vec![(0, None)]);
        assert_eq!(plan_ranges(0, 1, 42), vec![(42, None)]);
    }

    #[test]
    fn cover_is_exact_for_many_inputs() {
        for total in [1u64, 2, 7, 64, 1000, 16 * 1024, 1_000_003] {
            for count in [1usize, 2, 3, 7, 8, 64, 100] {
                for low in [0u64, 1, 500] {
                    let r = plan_ranges(total, count, low);
                    assert_exact_cover(&r, low, total);
                    assert_eq!(r.len() as u64, (count as u64).min(total));
                }
            }
        }
    }

    #[test]
    fn partition_creates_storage_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let kind = StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".to_string(),
        };
        let chunks = partition(64 * 1024, 8, 0, &kind).unwrap();
        assert_eq!(chunks.len(), 8);
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 8);
        assert!(chunks.iter().all(|c| c.position == 0));
    }
}
