//! Unique temp file creation for chunk storage.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

const TEMP_PREFIX: &str = "cdm-";

/// Create a new, collision-free file in `dir` ending with `extension` and return its
/// write handle and path. The file is kept on disk (not deleted on drop).
/// `dir` is created if missing.
pub fn create_unique_file(dir: &Path, extension: &str) -> io::Result<(File, PathBuf)> {
    fs::create_dir_all(dir)?;
    let named = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(extension)
        .tempfile_in(dir)?;
    named.keep().map_err(|e| e.error)
}
