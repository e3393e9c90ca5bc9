//! Free disk space lookup (used by the optional pre-download check).

use std::io;
use std::path::{Path, PathBuf};

/// Nearest existing ancestor of `path` (the path itself if it exists).
fn existing_ancestor(path: &Path) -> PathBuf {
    let mut cur = if path.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        path.to_path_buf()
    };
    loop {
        if cur.exists() {
            return cur;
        }
        match cur.parent() {
            Some(p) if !p.as_os_str().is_empty() => cur = p.to_path_buf(),
            _ => return PathBuf::from("."),
        }
    }
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
/// `path` need not exist yet; its nearest existing ancestor is queried.
#[cfg(unix)]
pub fn free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let target = existing_ancestor(path);
    let c_path = CString::new(target.as_os_str().as_bytes())?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let r = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if r != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

/// Non-Unix: no statvfs available, report unlimited space.
#[cfg(not(unix))]
pub fn free_space(path: &Path) -> io::Result<u64> {
    let _ = existing_ancestor(path);
    Ok(u64::MAX)
}

/// Returns `Some(available)` when `path`'s filesystem has fewer than `required` free bytes.
pub fn check_free_space(required: u64, path: &Path) -> io::Result<Option<u64>> {
    let available = free_space(path)?;
    if available < required {
        tracing::debug!(path = %path.display(), required, available, "insufficient free space");
        Ok(Some(available))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_dir_has_some_space() {
        let dir = tempfile::tempdir().unwrap();
        assert!(free_space(dir.path()).unwrap() > 0);
    }

    #[test]
    fn missing_path_uses_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("not").join("yet").join("file.bin");
        assert_eq!(existing_ancestor(&missing), dir.path());
        assert!(free_space(&missing).is_ok());
    }

    #[test]
    fn check_reports_shortfall() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(check_free_space(0, dir.path()).unwrap(), None);
        assert!(check_free_space(u64::MAX, dir.path()).unwrap().is_some());
    }
}
