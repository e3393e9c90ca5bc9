//! `cdm resume` – continue a download from its package snapshot.

use anyhow::{Context, Result};
use cdm_core::{DownloadConfig, DownloadService, Package};
use std::path::Path;

use super::session::Session;

pub async fn run_resume(cfg: DownloadConfig, snapshot: &Path) -> Result<()> {
    let package = Package::load(snapshot)
        .with_context(|| format!("reading package {}", snapshot.display()))?;
    if package.file_name.is_none() {
        anyhow::bail!("package {} has no destination file", snapshot.display());
    }
    println!(
        "Resuming {} ({} bytes already received)",
        package.address,
        package.received_bytes()
    );

    let session = Session::new(DownloadService::new(cfg));
    session.service().resume(package).await?;
    session.finish(Some(snapshot)).await
}
