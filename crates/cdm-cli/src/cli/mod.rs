//! CLI for the CDM download manager.

mod commands;

use anyhow::Result;
use cdm_core::config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use commands::{run_config, run_get, run_resume};

/// Top-level CLI for the CDM download manager.
#[derive(Debug, Parser)]
#[command(name = "cdm")]
#[command(about = "CDM: chunked, resumable download manager", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a URL.
    Get(GetArgs),

    /// Continue a download from a saved package snapshot.
    Resume {
        /// Path to the `.cdm.json` package written by an interrupted `get`.
        package: PathBuf,
    },

    /// Print the config file location and the effective configuration.
    Config,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Direct HTTP/HTTPS URL to download.
    pub url: String,

    /// Write to this file.
    #[arg(short, long, value_name = "FILE", conflicts_with = "dir")]
    pub output: Option<PathBuf>,

    /// Write into this directory, naming the file from the server or the URL
    /// (default: current directory).
    #[arg(short, long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Number of chunks to split the resource into.
    #[arg(long, value_name = "N")]
    pub chunks: Option<usize>,

    /// Fetch up to N chunks at once.
    #[arg(long, value_name = "N", conflicts_with = "serial")]
    pub parallel: Option<usize>,

    /// Fetch chunks one after another.
    #[arg(long)]
    pub serial: bool,

    /// Keep chunk data in temp files instead of memory.
    #[arg(long)]
    pub temp_files: bool,

    /// Download only bytes LOW..=HIGH of the resource.
    #[arg(long, value_name = "LOW-HIGH", value_parser = parse_range)]
    pub range: Option<(i64, i64)>,

    /// Retries per chunk after a transient failure.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
}

/// Parses `LOW-HIGH` (inclusive byte offsets).
pub fn parse_range(s: &str) -> Result<(i64, i64), String> {
    let (low, high) = s
        .split_once('-')
        .ok_or_else(|| format!("expected LOW-HIGH, got {:?}", s))?;
    let parse = |part: &str, what: &str| {
        part.trim()
            .parse::<u64>()
            .map(|v| i64::try_from(v).unwrap_or(i64::MAX))
            .map_err(|e| format!("bad range {} {:?}: {}", what, part, e))
    };
    Ok((parse(low, "start")?, parse(high, "end")?))
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Get(args) => run_get(cfg, &args).await?,
            CliCommand::Resume { package } => run_resume(cfg, &package).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
