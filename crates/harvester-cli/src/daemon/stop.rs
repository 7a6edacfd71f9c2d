//! Cooperative cancellation for the controller loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

#[derive(Default)]
struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// A one-shot stop flag that also interrupts pending sleeps.
#[derive(Clone, Default)]
pub struct StopSignal(Arc<Inner>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless stopped first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if stop was
    /// raised before or during the sleep.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let notified = self.0.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a raise in between is not lost.
        notified.as_mut().enable();
        if self.is_raised() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => !self.is_raised(),
            _ = notified => false,
        }
    }
}
