//! Chunked, resumable, parallel HTTP download engine.
//!
//! A resource is split into byte-range chunks, each fetched (and retried from where it
//! stopped) independently, then merged in offset order into memory or a file. The
//! package describing the chunks can be saved and resumed later.

pub mod bandwidth;
pub mod chunker;
pub mod config;
pub mod control;
pub(crate) mod downloader;
pub mod error;
pub mod events;
pub mod fetch_head;
pub mod logging;
pub mod package;
pub mod retry;
pub mod service;
pub mod storage;
pub mod transport;
pub mod url_model;

pub use config::{DownloadConfig, RequestConfig};
pub use control::CancelHandle;
pub use error::DownloadError;
pub use events::{ChannelObserver, DownloadEvent, DownloadObserver, PackageStatus};
pub use package::Package;
pub use service::DownloadService;
