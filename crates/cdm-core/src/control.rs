//! Cooperative cancellation shared between a service and its callers.
//!
//! A `CancelHandle` wraps the token of the current (or next) run. Runs clone the token
//! at start; `cancel()` trips it from any thread. A cancel issued while idle stays
//! pending and is observed by the next run at its first checkpoint.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct TokenSlot {
    token: CancellationToken,
    /// Set once a run has taken this token; a spent token is replaced at the next start.
    spent: bool,
}

/// Cloneable handle that cancels the run currently owned by a `DownloadService`.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    slot: Arc<Mutex<TokenSlot>>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TokenSlot> {
        // The slot only holds a token and a flag; a poisoned lock leaves it consistent.
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.lock().token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().token.is_cancelled()
    }

    /// Token for a new run. A token already consumed by a previous run is replaced; an
    /// unconsumed one (possibly cancelled while idle) is handed out as is.
    pub(crate) fn begin_run(&self) -> CancellationToken {
        let mut slot = self.lock();
        if slot.spent {
            slot.token = CancellationToken::new();
        }
        slot.spent = true;
        slot.token.clone()
    }

    /// Discard any pending cancellation.
    pub(crate) fn renew(&self) {
        let mut slot = self.lock();
        slot.token = CancellationToken::new();
        slot.spent = false;
    }
}
