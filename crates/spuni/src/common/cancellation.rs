//! Cooperative cancellation for decoding sessions.
//!
//! The decoding loop checks its token at the top of every iteration, before
//! issuing the next predictor call. Cancellation is a clean stop, not an
//! error: the tokens generated so far are returned to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A token polled by the decoding loop to detect cancellation.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token/handle pair.
    ///
    /// The token goes to the generation call; the handle stays with the
    /// caller (or another task) to trigger cancellation.
    pub fn new() -> (Self, CancellationHandle) {
        let cancelled = Arc::new(AtomicBool::new(false));
        let token = CancellationToken {
            cancelled: cancelled.clone(),
        };
        (token, CancellationHandle { cancelled })
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self::default()
    }

    /// Checks whether cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The caller-side handle that triggers cancellation.
#[derive(Clone)]
pub struct CancellationHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancellationHandle {
    /// Signals cancellation to every associated token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has already been triggered.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Auto-cancels after a wall-clock deadline.
    ///
    /// The engine enforces no timeout internally; a caller-supplied deadline
    /// is just cancellation injected at the right time.
    pub fn cancel_after(&self, timeout: std::time::Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            handle.cancel();
        });
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
