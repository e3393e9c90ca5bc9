//! Cancellable wait between retry attempts.

use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Sleeps for `delay` on the current (blocking) thread, waking early when `cancel` fires.
/// Returns false if cancelled.
pub fn wait_before_retry(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_when_not_cancelled() {
        let token = CancellationToken::new();
        assert!(wait_before_retry(Duration::from_millis(10), &token));
    }

    #[test]
    fn returns_early_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        assert!(!wait_before_retry(Duration::from_secs(10), &token));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
