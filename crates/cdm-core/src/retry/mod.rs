//! Retry policy.
//!
//! Error classification (timeouts, throttling, connection failures) and the fixed-count
//! retry decision shared by the chunk fetcher.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::ChunkError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::wait_before_retry;
