//! Chunk storage backends.
//!
//! Each chunk owns one append-only store: in memory ("on the fly") or a temp file.
//! The variant is chosen once per package from `DownloadConfig::on_the_fly_download`.

pub mod disk;
mod file;
mod memory;
pub mod temp;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::config::DownloadConfig;

/// Which storage variant new chunks get.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    TempFile { dir: PathBuf, extension: String },
}

impl StorageKind {
    pub fn from_config(cfg: &DownloadConfig) -> Self {
        if cfg.on_the_fly_download {
            StorageKind::Memory
        } else {
            StorageKind::TempFile {
                dir: cfg.temp_dir(),
                extension: cfg.temp_files_extension.clone(),
            }
        }
    }

    /// Create an empty store of this kind (a new unique temp file for `TempFile`).
    pub fn create(&self) -> io::Result<ChunkStorage> {
        match self {
            StorageKind::Memory => Ok(ChunkStorage::Memory(MemoryStorage::new())),
            StorageKind::TempFile { dir, extension } => {
                let (file, path) = temp::create_unique_file(dir, extension)?;
                Ok(ChunkStorage::File(FileStorage::with_writer(path, file)))
            }
        }
    }
}

/// Append/read surface bound to one chunk.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChunkStorage {
    Memory(MemoryStorage),
    File(FileStorage),
}

impl Default for ChunkStorage {
    fn default() -> Self {
        ChunkStorage::Memory(MemoryStorage::new())
    }
}

impl ChunkStorage {
    /// Append `buf` at the end of the stored bytes.
    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            ChunkStorage::Memory(m) => m.write(buf),
            ChunkStorage::File(f) => f.write(buf),
        }
    }

    /// Number of bytes stored. Stays valid after `flush`.
    pub fn len(&self) -> u64 {
        match self {
            ChunkStorage::Memory(m) => m.len(),
            ChunkStorage::File(f) => f.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reader over every byte written so far, starting at offset 0.
    pub fn open_read(&self) -> io::Result<StorageReader<'_>> {
        match self {
            ChunkStorage::Memory(m) => Ok(StorageReader::Memory(m.as_slice())),
            ChunkStorage::File(f) => match f.open_read() {
                Ok(file) => Ok(StorageReader::File(file)),
                // Cleared and never written again: nothing stored.
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(StorageReader::Memory(&[])),
                Err(e) => Err(e),
            },
        }
    }

    /// Backing temp file, if any.
    pub fn file_path(&self) -> Option<&Path> {
        match self {
            ChunkStorage::Memory(_) => None,
            ChunkStorage::File(f) => Some(f.path()),
        }
    }

    /// Make content durable and release write resources; content is kept.
    pub fn flush(&mut self) -> io::Result<()> {
        match self {
            ChunkStorage::Memory(_) => Ok(()),
            ChunkStorage::File(f) => f.flush(),
        }
    }

    /// Delete all stored bytes (removes the temp file).
    pub fn clear(&mut self) -> io::Result<()> {
        match self {
            ChunkStorage::Memory(m) => {
                m.clear();
                Ok(())
            }
            ChunkStorage::File(f) => f.clear(),
        }
    }
}

/// Readable view returned by `ChunkStorage::open_read`.
pub enum StorageReader<'a> {
    Memory(&'a [u8]),
    File(File),
}

impl Read for StorageReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            StorageReader::Memory(slice) => slice.read(buf),
            StorageReader::File(f) => f.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(storage: &ChunkStorage) -> Vec<u8> {
        let mut out = Vec::new();
        storage.open_read().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn memory_append_and_read() {
        let mut s = StorageKind::Memory.create().unwrap();
        s.write(b"hello ").unwrap();
        s.write(b"world").unwrap();
        assert_eq!(s.len(), 11);
        assert_eq!(read_all(&s), b"hello world");
        // A second reader starts from 0 again.
        assert_eq!(read_all(&s), b"hello world");
        s.clear().unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn file_append_read_flush_clear() {
        let dir = tempfile::tempdir().unwrap();
        let kind = StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".to_string(),
        };
        let mut s = kind.create().unwrap();
        s.write(b"aaaa").unwrap();
        assert_eq!(read_all(&s), b"aaaa");
        s.write(b"bb").unwrap();
        s.flush().unwrap();
        assert_eq!(s.len(), 6);
        assert_eq!(read_all(&s), b"aaaabb");

        let path = s.file_path().expect("file storage").to_path_buf();
        assert!(path.exists());
        s.clear().unwrap();
        assert!(!path.exists());
        assert_eq!(s.len(), 0);
        assert!(read_all(&s).is_empty());
    }

    #[test]
    fn file_storage_reattaches_after_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let kind = StorageKind::TempFile {
            dir: dir.path().to_path_buf(),
            extension: ".dsc".to_string(),
        };
        let mut s = kind.create().unwrap();
        s.write(b"first-").unwrap();
        s.flush().unwrap();

        let json = serde_json::to_string(&s).unwrap();
        drop(s);
        let mut restored: ChunkStorage = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.len(), 6);
        restored.write(b"second").unwrap();
        assert_eq!(read_all(&restored), b"first-second");
        restored.clear().unwrap();
    }

    #[test]
    fn memory_storage_snapshot_keeps_bytes() {
        let mut s = ChunkStorage::default();
        s.write(&[1, 2, 3]).unwrap();
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"kind\":\"memory\""));
        let restored: ChunkStorage = serde_json::from_str(&json).unwrap();
        assert_eq!(read_all(&restored), vec![1, 2, 3]);
    }

    #[test]
    fn kind_follows_on_the_fly_flag() {
        let cfg = DownloadConfig::default();
        assert_eq!(StorageKind::from_config(&cfg), StorageKind::Memory);
        let cfg = DownloadConfig {
            on_the_fly_download: false,
            temp_directory: Some(PathBuf::from("/tmp/x")),
            ..Default::default()
        };
        assert_eq!(
            StorageKind::from_config(&cfg),
            StorageKind::TempFile {
                dir: PathBuf::from("/tmp/x"),
                extension: ".dsc".to_string()
            }
        );
    }
}
