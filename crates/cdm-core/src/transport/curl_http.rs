//! libcurl-backed HTTP transport.
//!
//! One easy handle per request. Range reads validate the status (and `Content-Range`
//! for partial responses) before the first byte reaches the callback, so a server that
//! ignores the range cannot corrupt a chunk.

use curl::easy::{Easy, List};
use std::cell::RefCell;
use std::str;

use super::{validate_address, Flow, RangeRequest, ResourceInfo, Transport};
use crate::config::RequestConfig;
use crate::fetch_head::{self, parse_content_range, parse_status_line};
use crate::retry::ChunkError;
use crate::url_model;

/// Curl enforces a floor of 1 KiB on the receive buffer.
const MIN_BUFFER: usize = 1024;

/// Easy handle with the options shared by every request: redirects, timeouts,
/// user agent, proxy, custom headers.
pub(crate) fn new_easy(url: &str, cfg: &RequestConfig) -> Result<Easy, ChunkError> {
    validate_address(url)?;

    let mut easy = Easy::new();
    easy.url(url).map_err(ChunkError::Curl)?;
    easy.follow_location(true).map_err(ChunkError::Curl)?;
    easy.max_redirections(cfg.max_redirections)
        .map_err(ChunkError::Curl)?;
    easy.useragent(&cfg.user_agent).map_err(ChunkError::Curl)?;
    easy.connect_timeout(cfg.connect_timeout())
        .map_err(ChunkError::Curl)?;
    // Abort if throughput drops below 1 KiB/s for `low_speed_time`, instead of a hard
    // wall-clock timeout that would kill large chunks on slow links.
    easy.low_speed_limit(1024).map_err(ChunkError::Curl)?;
    easy.low_speed_time(cfg.low_speed_time())
        .map_err(ChunkError::Curl)?;
    if let Some(proxy) = &cfg.proxy {
        easy.proxy(proxy).map_err(ChunkError::Curl)?;
    }

    if !cfg.headers.is_empty() {
        let mut list = List::new();
        for (k, v) in &cfg.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))
                .map_err(ChunkError::Curl)?;
        }
        easy.http_headers(list).map_err(ChunkError::Curl)?;
    }
    Ok(easy)
}

/// HTTP(S) transport over libcurl.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    config: RequestConfig,
    /// Receive cap per connection in bytes/s.
    max_recv_speed: Option<u64>,
}

impl CurlTransport {
    pub fn new(config: RequestConfig) -> Self {
        let max_recv_speed = config.max_bytes_per_sec;
        Self {
            config,
            max_recv_speed,
        }
    }

    /// Split the configured speed cap evenly across `connections` parallel handles.
    pub fn with_connection_share(mut self, connections: usize) -> Self {
        self.max_recv_speed = self
            .config
            .max_bytes_per_sec
            .map(|cap| (cap / connections.max(1) as u64).max(1));
        self
    }

    pub fn config(&self) -> &RequestConfig {
        &self.config
    }
}

/// Checks the response status before any body byte is accepted.
fn check_response(request: &RangeRequest<'_>, headers: &[String]) -> Result<(), ChunkError> {
    let status = headers
        .iter()
        .rev()
        .find_map(|l| parse_status_line(l))
        .unwrap_or(0);
    if !(200..300).contains(&status) {
        return Err(ChunkError::Http(status));
    }
    if !request.ranged {
        return Ok(());
    }
    if status == 206 {
        let range_start = headers.iter().rev().find_map(|l| {
            let (name, value) = l.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("content-range") {
                parse_content_range(value)
            } else {
                None
            }
        });
        return match range_start {
            Some(range) if range.start == request.start => Ok(()),
            Some(_) => Err(ChunkError::RangeNotHonored {
                status,
                start: request.start,
            }),
            // No Content-Range on a 206: trust the status.
            None => Ok(()),
        };
    }
    // A full body is only usable when the requested range starts at 0.
    if request.start == 0 {
        Ok(())
    } else {
        Err(ChunkError::RangeNotHonored {
            status,
            start: request.start,
        })
    }
}

impl Transport for CurlTransport {
    fn resolve(&self, address: &str) -> Result<ResourceInfo, ChunkError> {
        let head = match fetch_head::head(address, &self.config) {
            Ok(head) => Some(head),
            // HEAD blocked or broken: the ranged request below decides.
            Err(ChunkError::Http(code)) => {
                tracing::debug!(address, code, "HEAD rejected, trying a ranged GET");
                None
            }
            Err(e) => return Err(e),
        };

        let needs_range_check = head
            .as_ref()
            .map_or(true, |h| !h.accept_ranges || h.content_length.unwrap_or(0) == 0);
        let mut info = ResourceInfo::default();
        let mut disposition = None;
        if let Some(h) = &head {
            info.total_size = h.content_length.unwrap_or(0);
            info.range_supported = h.accept_ranges;
            disposition = h.content_disposition.clone();
        }

        if needs_range_check {
            match fetch_head::range_head(address, &self.config) {
                Ok(ranged) => {
                    info.range_supported = ranged.status == Some(206);
                    if let Some(size) = ranged.resource_size() {
                        info.total_size = size;
                    }
                    disposition = disposition.or(ranged.content_disposition);
                }
                Err(e) if head.is_none() => return Err(e),
                Err(e) => {
                    tracing::debug!(address, error = %e, "ranged request failed, using HEAD result");
                }
            }
        }

        info.suggested_filename = disposition
            .as_deref()
            .and_then(url_model::filename_from_content_disposition);
        tracing::debug!(
            address,
            total_size = info.total_size,
            range_supported = info.range_supported,
            "resolved resource"
        );
        Ok(info)
    }

    fn read_range(
        &self,
        request: &RangeRequest<'_>,
        on_block: &mut dyn FnMut(&[u8]) -> Result<Flow, ChunkError>,
    ) -> Result<(), ChunkError> {
        let block_size = request.block_size.max(1);
        let headers = RefCell::new(Vec::<String>::new());
        let mut checked = false;
        // Why the write callback stopped the transfer, if it did.
        let mut stopped: Option<Result<(), ChunkError>> = None;

        let mut easy = new_easy(request.address, &self.config)?;
        easy.buffer_size(block_size.max(MIN_BUFFER))
            .map_err(ChunkError::Curl)?;
        easy.progress(true).map_err(ChunkError::Curl)?;
        if let Some(speed) = self.max_recv_speed {
            easy.max_recv_speed(speed).map_err(ChunkError::Curl)?;
        }
        if request.ranged {
            let range = match request.end {
                Some(end) => format!("{}-{}", request.start, end),
                None => format!("{}-", request.start),
            };
            easy.range(&range).map_err(ChunkError::Curl)?;
        }

        let performed = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(s) = str::from_utf8(data) {
                        headers.borrow_mut().push(s.trim_end().to_string());
                    }
                    true
                })
                .map_err(ChunkError::Curl)?;
            transfer
                .progress_function(|_, _, _, _| !request.cancel.is_cancelled())
                .map_err(ChunkError::Curl)?;
            transfer
                .write_function(|data| {
                    if !checked {
                        if let Err(e) = check_response(request, &headers.borrow()) {
                            stopped = Some(Err(e));
                            return Ok(0);
                        }
                        checked = true;
                    }
                    for block in data.chunks(block_size) {
                        match on_block(block) {
                            Ok(Flow::Continue) => {}
                            Ok(Flow::Done) => {
                                stopped = Some(Ok(()));
                                return Ok(0);
                            }
                            Err(e) => {
                                stopped = Some(Err(e));
                                return Ok(0);
                            }
                        }
                    }
                    Ok(data.len())
                })
                .map_err(ChunkError::Curl)?;
            transfer.perform()
        };

        match performed {
            Err(e) if e.is_write_error() => {
                return stopped.unwrap_or(Err(ChunkError::Curl(e)));
            }
            Err(e) if e.is_aborted_by_callback() => return Err(ChunkError::Cancelled),
            Err(e) => return Err(ChunkError::Curl(e)),
            Ok(()) => {}
        }

        let code = easy.response_code().map_err(ChunkError::Curl)?;
        if !(200..300).contains(&code) {
            return Err(ChunkError::Http(code));
        }
        Ok(())
    }
}
