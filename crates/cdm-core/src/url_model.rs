//! Local filename derivation for `start_in_directory`.
//!
//! Order of preference: the server's `Content-Disposition` filename, the last path
//! segment of the address, then a generated name. Every candidate is sanitized for the
//! local filesystem.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Linux NAME_MAX.
const NAME_MAX: usize = 255;

/// Filename from a `Content-Disposition` value. `filename*` (RFC 5987) wins over
/// `filename`.
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;
    for param in value.split(';').skip(1) {
        let Some((name, raw)) = param.split_once('=') else {
            continue;
        };
        let raw = raw.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                // charset'language'value
                let encoded = raw.splitn(3, '\'').nth(2).unwrap_or(raw);
                extended = Some(percent_decode(encoded.trim_matches('"')));
            }
            "filename" => plain = Some(unquote(raw)),
            _ => {}
        }
    }
    extended
        .and_then(|n| sanitize(&n))
        .or_else(|| plain.and_then(|n| sanitize(&n)))
}

/// Last non-empty path segment of `address`, percent-decoded.
pub fn filename_from_address(address: &str) -> Option<String> {
    let url = url::Url::parse(address).ok()?;
    let segment = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    sanitize(&percent_decode(segment))
}

/// Name unlikely to collide with anything else in the directory.
pub fn generated_file_name() -> String {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!(
        "download-{:x}-{}-{}",
        millis,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Destination path inside `dir` for `address`.
pub fn destination_in(dir: &Path, suggested: Option<&str>, address: &str) -> PathBuf {
    let name = suggested
        .and_then(sanitize)
        .or_else(|| filename_from_address(address))
        .unwrap_or_else(generated_file_name);
    dir.join(name)
}

/// Replace path separators and control characters, trim dots and blanks, and cap the
/// length. `None` when nothing usable is left.
pub fn sanitize(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    Some(trimmed[..end].to_string())
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
    else {
        return raw.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for c in inner.chars() {
        if escaped || c != '\\' {
            out.push(c);
            escaped = false;
        } else {
            escaped = true;
        }
    }
    out
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
