//! Process-wide cancellation signal.
//!
//! Raising the signal stops the aggregator from starting new chunks; requests
//! already in flight settle normally. HTTP calls in progress are never aborted;
//! a pending retry backoff ends at once and no further attempt is made.

use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a cancellation signal
pub type SharedShutdown = Arc<ShutdownSignal>;

static GLOBAL_SHUTDOWN: OnceCell<SharedShutdown> = OnceCell::new();

/// Register the process-wide signal. Only the first registration sticks.
pub fn set_global_shutdown(handle: SharedShutdown) {
    let _ = GLOBAL_SHUTDOWN.set(handle);
}

/// The registered process-wide signal, if any
pub fn global_shutdown() -> Option<SharedShutdown> {
    GLOBAL_SHUTDOWN.get().cloned()
}

/// One-shot cancellation flag with async waiters
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create an unraised signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an unraised signal wrapped in [`Arc`]
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Raise the signal. Waiters are woken once; later calls do nothing.
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether the signal has been raised
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Resolve once the signal is raised
    pub async fn raised(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent raise is not lost.
        notified.as_mut().enable();
        if self.is_raised() {
            return;
        }
        notified.await;
    }
}

/// Whether an optional signal has been raised
pub fn is_raised(signal: Option<&SharedShutdown>) -> bool {
    signal.map(|s| s.is_raised()).unwrap_or(false)
}
