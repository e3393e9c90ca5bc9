//! Transport seam between the engine and the network.
//!
//! The engine needs two things from a transport: resource metadata (size, range
//! support, a filename hint) and a way to stream a byte range block by block.
//! Calls are blocking; the engine runs them on `spawn_blocking`.

pub mod curl_http;

pub use curl_http::CurlTransport;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::retry::ChunkError;

/// Metadata about the remote resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    /// Size in bytes; 0 when the server does not report it.
    pub total_size: u64,
    /// Server honors byte-range requests.
    pub range_supported: bool,
    /// Filename hint from `Content-Disposition`, if any.
    pub suggested_filename: Option<String>,
}

/// One streaming read of `[start, end]` (inclusive).
#[derive(Debug)]
pub struct RangeRequest<'a> {
    pub address: &'a str,
    pub start: u64,
    /// `None` reads to the end of the resource.
    pub end: Option<u64>,
    /// Send a `Range` header. False for sources without range support, in which case
    /// `start` is always 0.
    pub ranged: bool,
    /// Upper bound for the size of each block handed to the callback.
    pub block_size: usize,
    pub cancel: &'a CancellationToken,
}

/// Returned by the block callback to continue or stop the read early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

pub trait Transport: Send + Sync {
    /// Fetch size and range support for `address`.
    fn resolve(&self, address: &str) -> Result<ResourceInfo, ChunkError>;

    /// Stream the requested range, calling `on_block` with consecutive blocks of at most
    /// `request.block_size` bytes. Returns once the response ends, the callback returns
    /// `Flow::Done`, or an error occurs. An error from the callback is returned as is.
    fn read_range(
        &self,
        request: &RangeRequest<'_>,
        on_block: &mut dyn FnMut(&[u8]) -> Result<Flow, ChunkError>,
    ) -> Result<(), ChunkError>;
}

/// Check that `address` is an absolute http(s) URL.
pub fn validate_address(address: &str) -> Result<Url, ChunkError> {
    let url = Url::parse(address.trim())
        .map_err(|e| ChunkError::InvalidAddress(format!("{}: {}", address, e)))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ChunkError::InvalidAddress(format!(
                "{}: unsupported scheme {}",
                address, other
            )))
        }
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ChunkError::InvalidAddress(format!("{}: missing host", address)));
    }
    Ok(url)
}
