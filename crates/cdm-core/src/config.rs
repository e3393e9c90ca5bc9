use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Transport-level request options. Opaque to the engine; handed to the transport as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Extra request headers (e.g. `Authorization`, `Cookie`).
    pub headers: HashMap<String, String>,
    /// User-Agent header value.
    pub user_agent: String,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a transfer when throughput stays below 1 KiB/s for this many seconds.
    pub low_speed_time_secs: u64,
    /// Optional proxy URL passed to libcurl (e.g. `http://127.0.0.1:3128`).
    pub proxy: Option<String>,
    /// Maximum number of redirects to follow.
    pub max_redirections: u32,
    /// Optional receive cap in bytes per second for the whole download (None = no cap).
    pub max_bytes_per_sec: Option<u64>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            headers: HashMap::new(),
            user_agent: format!("cdm/{}", env!("CARGO_PKG_VERSION")),
            connect_timeout_secs: 30,
            low_speed_time_secs: 60,
            proxy: None,
            max_redirections: 10,
            max_bytes_per_sec: None,
        }
    }
}

impl RequestConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    pub fn low_speed_time(&self) -> Duration {
        Duration::from_secs(self.low_speed_time_secs.max(1))
    }
}

/// Download policy, loaded from `~/.config/cdm/config.toml`.
///
/// The orchestrator never mutates the caller's copy: each run normalizes its own clone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Bytes per network read block (also the progress event granularity).
    pub buffer_block_size: usize,
    /// Desired number of chunks; normalized per run (1 without range support).
    pub chunk_count: usize,
    /// Fetch chunks in parallel (true) or strictly one after another (false).
    pub parallel_download: bool,
    /// Maximum number of chunk fetches with outstanding network I/O in parallel mode.
    pub parallel_count: usize,
    /// Retries per chunk after a transient failure (0 = fail on first error).
    pub max_try_again_on_failover: u32,
    /// Fixed delay between retries of one chunk, in milliseconds.
    pub retry_delay_ms: u64,
    /// Keep chunk bytes in memory (true) or in temp files (false).
    pub on_the_fly_download: bool,
    /// Download only `[range_low, range_high]` of the resource.
    pub range_download: bool,
    pub range_low: i64,
    pub range_high: i64,
    /// Fail before chunking when the destination lacks free space.
    pub check_disk_size_before_download: bool,
    /// Delete partial chunks after a failed run instead of keeping them for resume.
    /// Cancelled runs always keep their chunks.
    pub clear_package_on_completion_with_failure: bool,
    /// Directory for temp chunk files (system temp dir when unset).
    pub temp_directory: Option<PathBuf>,
    /// Extension for temp chunk files.
    pub temp_files_extension: String,
    pub request: RequestConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            buffer_block_size: 8 * 1024,
            chunk_count: 1,
            parallel_download: false,
            parallel_count: 4,
            max_try_again_on_failover: 5,
            retry_delay_ms: 1000,
            on_the_fly_download: true,
            range_download: false,
            range_low: 0,
            range_high: 0,
            check_disk_size_before_download: true,
            clear_package_on_completion_with_failure: false,
            temp_directory: None,
            temp_files_extension: ".dsc".to_string(),
            request: RequestConfig::default(),
        }
    }
}

impl DownloadConfig {
    /// Concurrency cap actually applied by the scheduler (1 in serial mode).
    pub fn effective_parallel_count(&self) -> usize {
        if self.parallel_download {
            self.parallel_count.max(1)
        } else {
            1
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Temp directory for chunk files, defaulting to the system temp dir.
    pub fn temp_dir(&self) -> PathBuf {
        self.temp_directory
            .clone()
            .filter(|dir| !dir.as_os_str().to_string_lossy().trim().is_empty())
            .unwrap_or_else(std::env::temp_dir)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("cdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DownloadConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DownloadConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DownloadConfig = toml::from_str(&data)?;
    Ok(cfg)
}
