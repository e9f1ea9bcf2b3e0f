//! Guards that hold back the return of a pending cancellation.

use std::sync::Weak;
use std::time::Duration;

use tracing::debug;

use crate::cancel::source::{CancellationToken, Shared};

/// Defers completion of [`CancellationSource::cancel`] while a protected
/// section runs.
///
/// `cancel()` still flips the requested flag and notifies observers right
/// away; it only waits for the guard before returning to its caller. A guard
/// is released exactly once, by [`release`](Self::release) or on drop. With a
/// timeout, a guard that is still held that long after `cancel()` started
/// waiting is treated as released and cancellation proceeds even though the
/// guarded section may still be running.
///
/// Never hold a guard on the thread that calls `cancel()` without a timeout:
/// the call waits for a release that can never happen.
///
/// A guard created after cancellation was requested is inert.
///
/// [`CancellationSource::cancel`]: crate::cancel::CancellationSource::cancel
#[must_use = "a guard only protects while it is held"]
pub struct CancellationGuard {
    shared: Weak<Shared>,
    id: Option<u64>,
}

impl CancellationGuard {
    pub fn new(token: &CancellationToken, timeout: Option<Duration>) -> Self {
        let shared = token.shared().clone();
        let id = shared.upgrade().and_then(|s| s.add_guard(timeout));
        if id.is_none() {
            debug!("cancellation guard created inert");
        }
        Self { shared, id }
    }

    /// Whether this guard still holds back cancellation.
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    pub fn release(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if let Some(shared) = self.shared.upgrade() {
            shared.release_guard(id);
        }
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.release();
    }
}
