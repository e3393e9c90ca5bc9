//! Temp-file-backed chunk storage.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only temp file. Only the path is persisted; the write handle is opened lazily
/// (append mode) so a deserialized package reattaches to its existing partial file.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileStorage {
    path: PathBuf,
    #[serde(skip)]
    writer: Option<File>,
}

impl FileStorage {
    /// Bind to the handle returned by `temp::create_unique_file`.
    pub fn with_writer(path: PathBuf, file: File) -> Self {
        Self {
            path,
            writer: Some(file),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> io::Result<&mut File> {
        let file = match self.writer.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?,
        };
        Ok(self.writer.insert(file))
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer()?.write_all(buf)
    }

    /// Bytes on disk. Valid after the write handle has been released.
    pub fn len(&self) -> u64 {
        fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Open the file for reading from offset 0; does not touch the write handle.
    pub fn open_read(&self) -> io::Result<File> {
        File::open(&self.path)
    }

    /// Sync and release the write handle; the file stays on disk for resume.
    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.writer.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Release the write handle and delete the file.
    pub fn clear(&mut self) -> io::Result<()> {
        self.writer = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
