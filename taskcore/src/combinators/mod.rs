//! Combinators composing fallible steps with defined ordering.
//!
//! - [`apply_with_rollback`]: all-or-nothing application with compensation.
//! - [`try_any`]: first success among alternatives.
//! - [`retry`]: bounded re-attempts of one error kind.
//!
//! The `_async` variants keep the same ordering and classification; each
//! step is awaited to completion before the next one starts.

mod blocking;
mod suspending;

use std::fmt::{self, Display};
use std::time::Duration;

use crate::error::{Classify, ErrorKind};

pub use blocking::{apply_with_rollback, retry, try_any};
pub use suspending::{apply_with_rollback_async, retry_async, try_any_async};

/// Attempt budget and the one error kind worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPlan {
    /// Retries after the first attempt; the action runs at most
    /// `max_retries + 1` times.
    pub max_retries: u32,
    pub kind: ErrorKind,
    /// Pause between attempts.
    pub delay: Duration,
}

impl RetryPlan {
    pub const fn new(max_retries: u32, kind: ErrorKind) -> Self {
        Self {
            max_retries,
            kind,
            delay: Duration::ZERO,
        }
    }

    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether `err` is of the planned kind, and that kind may be retried at
    /// all (cancellation and validation failures never are).
    pub fn matches<E: Classify>(&self, err: &E) -> bool {
        let kind = err.kind();
        kind == self.kind && kind.is_retryable()
    }
}

/// Failure of an apply-with-rollback run.
///
/// Carries the apply failure that stopped the run, unchanged, together with
/// every rollback that failed while compensating for it.
#[derive(Debug)]
pub struct RollbackError<E, RE> {
    /// Index of the item whose apply failed.
    pub index: usize,
    pub error: E,
    /// `(item index, failure)` in the order the rollbacks ran.
    pub rollback_failures: Vec<(usize, RE)>,
}

impl<E, RE> RollbackError<E, RE> {
    /// The original apply failure; rollback failures are dropped.
    pub fn into_inner(self) -> E {
        self.error
    }

    pub fn fully_rolled_back(&self) -> bool {
        self.rollback_failures.is_empty()
    }
}

impl<E: Display, RE> Display for RollbackError<E, RE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;
        match self.rollback_failures.len() {
            0 => Ok(()),
            1 => f.write_str(" (1 rollback failed)"),
            n => write!(f, " ({n} rollbacks failed)"),
        }
    }
}

impl<E, RE> std::error::Error for RollbackError<E, RE>
where
    E: std::error::Error + 'static,
    RE: fmt::Debug,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}
