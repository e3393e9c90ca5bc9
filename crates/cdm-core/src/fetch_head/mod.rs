//! HTTP metadata lookup.
//!
//! Uses the curl crate (libcurl) to fetch response headers and read
//! `Content-Length`, `Accept-Ranges: bytes`, `Content-Range` and
//! `Content-Disposition`. Servers that block HEAD or omit the length get a
//! one-byte ranged GET instead.

mod parse;

pub(crate) use parse::{parse_content_range, parse_status_line};

use std::cell::{Cell, RefCell};
use std::str;

use crate::config::RequestConfig;
use crate::retry::ChunkError;
use crate::transport::curl_http::new_easy;

/// Parsed `Content-Range` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    /// Inclusive.
    pub end: u64,
    /// Complete length; `None` for `*`.
    pub total: Option<u64>,
}

/// Key headers of the final response in a redirect chain.
#[derive(Debug, Clone, Default)]
pub struct HeadResult {
    pub status: Option<u32>,
    /// Total size in bytes, if `Content-Length` is present.
    pub content_length: Option<u64>,
    /// True if server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    pub content_range: Option<ContentRange>,
    /// `Content-Disposition` value if present (filename hint).
    pub content_disposition: Option<String>,
}

impl HeadResult {
    /// Size of the whole resource: the `Content-Range` total for a partial response,
    /// otherwise `Content-Length`.
    pub fn resource_size(&self) -> Option<u64> {
        match (self.status, self.content_range) {
            (Some(206), Some(range)) => range.total,
            _ => self.content_length,
        }
    }
}

fn collect_header(headers: &RefCell<Vec<String>>, data: &[u8]) {
    if let Ok(s) = str::from_utf8(data) {
        headers.borrow_mut().push(s.trim_end().to_string());
    }
}

/// Performs a HEAD request and returns parsed metadata.
///
/// Runs in the current thread; call from `spawn_blocking` if used from async code.
pub fn head(url: &str, cfg: &RequestConfig) -> Result<HeadResult, ChunkError> {
    let headers = RefCell::new(Vec::new());

    let mut easy = new_easy(url, cfg)?;
    easy.nobody(true).map_err(ChunkError::Curl)?;
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                collect_header(&headers, data);
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer.perform().map_err(ChunkError::Curl)?;
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    Ok(parse::parse_headers(&headers.into_inner()))
}

/// Performs `GET` with `Range: bytes=0-0` and returns the response headers. The body is
/// discarded; a server that ignores the range gets its transfer aborted after the
/// headers.
pub fn range_head(url: &str, cfg: &RequestConfig) -> Result<HeadResult, ChunkError> {
    let headers = RefCell::new(Vec::new());
    let aborted = Cell::new(false);

    let mut easy = new_easy(url, cfg)?;
    easy.range("0-0").map_err(ChunkError::Curl)?;
    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                collect_header(&headers, data);
                true
            })
            .map_err(ChunkError::Curl)?;
        transfer
            .write_function(|data| {
                let partial = headers
                    .borrow()
                    .iter()
                    .rev()
                    .find_map(|l| parse_status_line(l))
                    == Some(206);
                if partial {
                    Ok(data.len())
                } else {
                    aborted.set(true);
                    Ok(0)
                }
            })
            .map_err(ChunkError::Curl)?;
        transfer.perform()
    };
    match performed {
        Err(e) if e.is_write_error() && aborted.get() => {}
        Err(e) => return Err(ChunkError::Curl(e)),
        Ok(()) => {}
    }

    let code = easy.response_code().map_err(ChunkError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(ChunkError::Http(code));
    }
    Ok(parse::parse_headers(&headers.into_inner()))
}
