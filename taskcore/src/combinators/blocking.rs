//! Combinators for steps that run on the calling thread.

use std::fmt::Display;
use std::thread;

use tracing::{debug, error, warn};

use crate::combinators::{RetryPlan, RollbackError};
use crate::error::{Classify, TaskError};

/// Apply `apply` to each item in order, all or nothing.
///
/// On the first failure, `rollback` runs for every item whose apply was
/// attempted (the failing one included, since it may have partially
/// applied), newest first. The original failure comes back unchanged in
/// [`RollbackError::error`]. A failing rollback is logged and recorded in
/// [`RollbackError::rollback_failures`]; the remaining rollbacks still run.
pub fn apply_with_rollback<I, E, RE, A, R>(
    items: &[I],
    mut apply: A,
    mut rollback: R,
) -> Result<(), RollbackError<E, RE>>
where
    A: FnMut(&I) -> Result<(), E>,
    R: FnMut(&I) -> Result<(), RE>,
    RE: Display,
{
    for (index, item) in items.iter().enumerate() {
        if let Err(err) = apply(item) {
            warn!(index, rollbacks = index + 1, "apply failed, rolling back");
            let mut rollback_failures = Vec::new();
            for (undo, attempted) in items[..=index].iter().enumerate().rev() {
                if let Err(rollback_err) = rollback(attempted) {
                    error!(index = undo, err = %rollback_err, "rollback failed");
                    rollback_failures.push((undo, rollback_err));
                }
            }
            return Err(RollbackError {
                index,
                error: err,
                rollback_failures,
            });
        }
    }
    Ok(())
}

/// Run `action` on each item until one succeeds.
///
/// Returns the first success. When every item fails, the last failure is
/// returned and earlier ones are discarded. No items is a validation error.
pub fn try_any<I, T, E, F>(items: impl IntoIterator<Item = I>, mut action: F) -> Result<T, E>
where
    F: FnMut(I) -> Result<T, E>,
    E: From<TaskError> + Display,
{
    let mut last = None;
    for (index, item) in items.into_iter().enumerate() {
        match action(item) {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(index, %err, "alternative failed");
                last = Some(err);
            }
        }
    }
    Err(last.unwrap_or_else(|| TaskError::validation("try_any needs at least one item").into()))
}

/// Run `action` until it succeeds, fails with a kind other than
/// `plan.kind`, or runs out of attempts.
///
/// `action` receives `true` on its final attempt so it can fall back
/// instead of failing. Whatever the final attempt returns is returned.
pub fn retry<T, E, F>(plan: &RetryPlan, mut action: F) -> Result<T, E>
where
    F: FnMut(bool) -> Result<T, E>,
    E: Classify + Display,
{
    let attempts = plan.attempts();
    let mut attempt = 1;
    loop {
        let is_last = attempt >= attempts;
        match action(is_last) {
            Ok(value) => return Ok(value),
            Err(err) if !is_last && plan.matches(&err) => {
                debug!(attempt, attempts, %err, "retrying");
                if !plan.delay.is_zero() {
                    thread::sleep(plan.delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
