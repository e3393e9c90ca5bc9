//! Chunk descriptor: one contiguous byte range of the source and its storage.

use serde::{Deserialize, Serialize};
use std::io;

use crate::storage::ChunkStorage;

/// One contiguous byte range `[start, end]` (inclusive) of the source.
///
/// `end == None` marks an open-ended chunk: the resource size is unknown and the
/// chunk takes whatever the server sends. `position` counts bytes already stored;
/// storage always holds exactly `position` bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct Chunk {
    pub start: u64,
    pub end: Option<u64>,
    #[serde(default)]
    pub position: u64,
    #[serde(default)]
    pub failover_count: u32,
    #[serde(default)]
    pub storage: ChunkStorage,
}

impl Chunk {
    pub fn new(start: u64, end: Option<u64>, storage: ChunkStorage) -> Self {
        Self {
            start,
            end,
            position: 0,
            failover_count: 0,
            storage,
        }
    }

    /// Fixed length in bytes; 0 for an open-ended chunk.
    pub fn length(&self) -> u64 {
        match self.end {
            Some(end) => end.saturating_sub(self.start) + 1,
            None => 0,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.end.is_none()
    }

    /// Bytes still missing, or `None` when the length is unknown.
    pub fn remaining(&self) -> Option<u64> {
        self.end.map(|_| self.length().saturating_sub(self.position))
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.remaining(), Some(0))
    }

    /// Absolute offset of the next byte to fetch.
    pub fn next_offset(&self) -> u64 {
        self.start + self.position
    }

    /// Reconcile `position` with what storage actually holds (after reattaching a
    /// persisted package). Storage larger than the chunk is discarded.
    pub fn set_valid_position(&mut self) -> io::Result<()> {
        let stored = self.storage.len();
        if !self.is_open_ended() && stored > self.length() {
            tracing::warn!(
                start = self.start,
                stored,
                length = self.length(),
                "chunk storage exceeds chunk length, discarding"
            );
            self.storage.clear()?;
            self.position = 0;
            return Ok(());
        }
        self.position = stored;
        Ok(())
    }

    /// Append a block and advance `position`. Bytes beyond the chunk end are dropped.
    /// Returns how many bytes were stored.
    pub fn write_block(&mut self, block: &[u8]) -> io::Result<usize> {
        let take = match self.remaining() {
            Some(left) => block.len().min(usize::try_from(left).unwrap_or(usize::MAX)),
            None => block.len(),
        };
        if take == 0 {
            return Ok(0);
        }
        self.storage.write(&block[..take])?;
        self.position += take as u64;
        Ok(take)
    }

    /// Delete stored bytes and rewind to the chunk start.
    pub fn clear(&mut self) -> io::Result<()> {
        self.storage.clear()?;
        self.position = 0;
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.storage.flush()
    }
}
