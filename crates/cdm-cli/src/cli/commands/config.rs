//! `cdm config` – show where the config lives and what it resolves to.

use anyhow::Result;
use cdm_core::config::{self, DownloadConfig};

pub fn run_config(cfg: &DownloadConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}
