//! Per-run option normalization, applied after metadata resolution and before chunking.

use std::path::Path;

use crate::config::DownloadConfig;
use crate::error::DownloadError;
use crate::package::Package;
use crate::storage::disk;

/// Adjust `cfg` (the run's private copy) and `package.total_size` to what the server
/// and the local disks allow. Rules run in a fixed order; later rules see the effects
/// of earlier ones.
pub(super) fn normalize(cfg: &mut DownloadConfig, package: &mut Package) -> Result<(), DownloadError> {
    if !package.range_supported {
        cfg.chunk_count = 1;
    }

    apply_range(cfg, package)?;

    if package.total_size <= 1 {
        package.total_size = 0;
        cfg.chunk_count = 1;
    }

    if let Some(path) = &package.file_name {
        if path.is_dir() {
            return Err(DownloadError::InvalidDestination {
                path: path.clone(),
                reason: "is a directory".into(),
            });
        }
    }

    if cfg.check_disk_size_before_download {
        check_sizes(cfg, package)?;
    }

    tracing::debug!(
        total_size = package.total_size,
        chunk_count = cfg.chunk_count,
        range_low = cfg.range_low,
        range_high = cfg.range_high,
        "normalized options"
    );
    Ok(())
}

fn apply_range(cfg: &mut DownloadConfig, package: &mut Package) -> Result<(), DownloadError> {
    if !cfg.range_download {
        cfg.range_low = 0;
        cfg.range_high = 0;
        return Ok(());
    }
    if !package.range_supported {
        return Err(DownloadError::NotSupported(format!(
            "{} does not support downloading a specific range",
            package.address
        )));
    }

    if cfg.range_high < cfg.range_low {
        cfg.range_low = cfg.range_high - 1;
    }
    if cfg.range_low < 0 {
        cfg.range_low = 0;
    }
    if cfg.range_high < 0 {
        cfg.range_high = cfg.range_low;
    }
    if package.total_size > 0 {
        // Last addressable byte of the resource.
        let last = i64::try_from(package.total_size - 1).unwrap_or(i64::MAX);
        cfg.range_high = cfg.range_high.min(last);
    }

    let span = cfg.range_high - cfg.range_low + 1;
    package.total_size = u64::try_from(span).unwrap_or(0);
    Ok(())
}

fn ensure_space(required: u64, path: &Path) -> Result<(), DownloadError> {
    if let Some(available) = disk::check_free_space(required, path)? {
        return Err(DownloadError::InsufficientStorage {
            path: path.to_path_buf(),
            required,
            available,
        });
    }
    Ok(())
}

fn check_sizes(cfg: &DownloadConfig, package: &Package) -> Result<(), DownloadError> {
    let required = package.total_size;
    if required == 0 {
        return Ok(());
    }
    if let Some(dest) = &package.file_name {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        ensure_space(required, dir)?;
    }
    if !cfg.on_the_fly_download {
        ensure_space(required, &cfg.temp_dir())?;
    }
    Ok(())
}

/// Range start used for chunking (0 when no explicit range is active).
pub(super) fn range_low(cfg: &DownloadConfig) -> u64 {
    u64::try_from(cfg.range_low).unwrap_or(0)
}
