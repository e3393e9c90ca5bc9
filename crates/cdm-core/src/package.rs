//! Resumable download descriptor.
//!
//! A `Package` carries everything needed to continue a download later: the address,
//! destination, normalized size, range support, and the chunk sequence with positions
//! and storage descriptors. It serializes to JSON so a cancelled run can be resumed by
//! another process.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::chunker::Chunk;
use crate::error::DownloadError;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Package {
    pub address: String,
    /// Destination file; `None` means the result is returned in memory.
    pub file_name: Option<PathBuf>,
    /// Normalized size in bytes; 0 when unknown.
    pub total_size: u64,
    pub range_supported: bool,
    /// Chunk sequence, created on the first run and reused on resume.
    pub chunks: Option<Vec<Chunk>>,
    #[serde(default)]
    pub is_saving: bool,
    #[serde(default)]
    pub is_save_complete: bool,
    /// Percentage of `total_size` received so far.
    #[serde(default)]
    pub save_progress: f64,
}

/// Lightweight view of a package, attached to `Completed` events.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageStatus {
    pub address: String,
    pub file_name: Option<PathBuf>,
    pub total_size: u64,
    pub received_bytes: u64,
    pub chunk_count: usize,
    pub is_save_complete: bool,
    pub save_progress: f64,
}

impl Package {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Sum of chunk positions.
    pub fn received_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .flatten()
            .map(|c| c.position)
            .sum()
    }

    /// Reconcile every chunk with its storage and check that the chunk sequence covers
    /// exactly `[range_low, range_low + total_size)`.
    pub fn validate(&mut self, total_size: u64, range_low: u64) -> Result<(), DownloadError> {
        let chunks = self
            .chunks
            .as_mut()
            .ok_or_else(|| DownloadError::InvalidPackage("package has no chunks".into()))?;
        if chunks.is_empty() {
            return Err(DownloadError::InvalidPackage("package has no chunks".into()));
        }

        for chunk in chunks.iter_mut() {
            chunk.set_valid_position()?;
        }

        if chunks[0].start != range_low {
            return Err(DownloadError::InvalidPackage(format!(
                "first chunk starts at {}, expected {}",
                chunks[0].start, range_low
            )));
        }

        if total_size == 0 {
            if chunks.len() != 1 || !chunks[0].is_open_ended() {
                return Err(DownloadError::InvalidPackage(
                    "unknown size requires a single open-ended chunk".into(),
                ));
            }
            return Ok(());
        }

        let mut next = range_low;
        for (index, chunk) in chunks.iter().enumerate() {
            let end = chunk.end.ok_or_else(|| {
                DownloadError::InvalidPackage(format!("chunk {} is open-ended", index))
            })?;
            if chunk.start != next || end < chunk.start {
                return Err(DownloadError::InvalidPackage(format!(
                    "chunk {} range {}-{} is not contiguous at {}",
                    index, chunk.start, end, next
                )));
            }
            next = end + 1;
        }
        if next != range_low + total_size {
            return Err(DownloadError::InvalidPackage(format!(
                "chunks cover {} bytes, expected {}",
                next - range_low,
                total_size
            )));
        }
        Ok(())
    }

    /// Make every chunk's storage durable and release write handles. Data is kept.
    pub fn flush(&mut self) -> io::Result<()> {
        for chunk in self.chunks.iter_mut().flatten() {
            chunk.flush()?;
        }
        Ok(())
    }

    /// Delete every chunk's stored bytes (removes temp files) and rewind positions.
    pub fn clear(&mut self) -> io::Result<()> {
        for chunk in self.chunks.iter_mut().flatten() {
            chunk.clear()?;
        }
        self.save_progress = 0.0;
        Ok(())
    }

    pub fn status(&self) -> PackageStatus {
        PackageStatus {
            address: self.address.clone(),
            file_name: self.file_name.clone(),
            total_size: self.total_size,
            received_bytes: self.received_bytes(),
            chunk_count: self.chunks.as_ref().map_or(0, Vec::len),
            is_save_complete: self.is_save_complete,
            save_progress: self.save_progress,
        }
    }

    /// Write a JSON snapshot. Call `flush` first so temp-file chunks are durable.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(fs::File::create(path)?);
        serde_json::to_writer_pretty(&mut out, self)?;
        out.flush()
    }

    pub fn load(path: &Path) -> io::Result<Self> {
        let reader = BufReader::new(fs::File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
