//! `cdm get` – download one URL.

use anyhow::Result;
use cdm_core::{DownloadConfig, DownloadService};

use super::session::Session;
use crate::cli::GetArgs;

/// Fold command-line flags over the loaded config.
pub(crate) fn apply_overrides(mut cfg: DownloadConfig, args: &GetArgs) -> DownloadConfig {
    if let Some(n) = args.chunks {
        cfg.chunk_count = n.max(1);
    }
    if let Some(n) = args.parallel {
        cfg.parallel_download = true;
        cfg.parallel_count = n.max(1);
    }
    if args.serial {
        cfg.parallel_download = false;
    }
    if args.temp_files {
        cfg.on_the_fly_download = false;
    }
    if let Some((low, high)) = args.range {
        cfg.range_download = true;
        cfg.range_low = low;
        cfg.range_high = high;
    }
    if let Some(n) = args.retries {
        cfg.max_try_again_on_failover = n;
    }
    cfg
}

pub async fn run_get(cfg: DownloadConfig, args: &GetArgs) -> Result<()> {
    let cfg = apply_overrides(cfg, args);
    let session = Session::new(DownloadService::new(cfg));

    match (&args.output, &args.dir) {
        (Some(path), _) => session.service().start_file(&args.url, path).await?,
        (None, Some(dir)) => session.service().start_in_directory(&args.url, dir).await?,
        (None, None) => {
            let dir = std::env::current_dir()?;
            session.service().start_in_directory(&args.url, &dir).await?
        }
    }

    session.finish(None).await
}
