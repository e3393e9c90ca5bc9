//! In-memory ("on the fly") chunk storage.

use serde::{Deserialize, Serialize};
use std::io;

/// Append-only byte buffer held in process memory. Serialized with its content so a
/// package snapshot of an on-the-fly download is resumable on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStorage {
    data: Vec<u8>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.data.extend_from_slice(buf);
        Ok(())
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data = Vec::new();
    }
}
