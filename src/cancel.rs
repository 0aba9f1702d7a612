//! Cooperative cancellation utilities.
//!
//! Provides a lightweight [`CancellationCoordinator`] that can be shared
//! between a running batch, signal handlers and subscriber callbacks.
//! Requesting cancellation only prevents new task starts; tasks that are
//! already executing are allowed to finish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a cancellation coordinator.
pub type SharedCancellation = Arc<CancellationCoordinator>;

/// Coordinates cooperative cancellation across async tasks.
#[derive(Debug, Default)]
pub struct CancellationCoordinator {
    is_cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedCancellation {
        Arc::new(Self::new())
    }

    /// Request cancellation. Idempotent; waiters are notified exactly once.
    ///
    /// Returns `true` if this call flipped the flag.
    pub fn request_cancel(&self) -> bool {
        if !self.is_cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
            return true;
        }
        false
    }

    /// Whether cancellation has been requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.is_cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the coordinator can guard a fresh run.
    pub fn reset(&self) {
        self.is_cancelled.store(false, Ordering::SeqCst);
    }

    /// Wait until cancellation is requested. Returns immediately if already set.
    pub async fn wait_for_cancel(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent request is not missed
        notified.as_mut().enable();
        if self.is_cancel_requested() {
            return;
        }
        notified.await;
    }
}
