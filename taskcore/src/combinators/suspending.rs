//! Combinators for steps that suspend instead of blocking.
//!
//! Same contracts as the blocking variants. Steps are awaited one at a time,
//! so attempts and rollbacks within one call never overlap.

use std::fmt::Display;
use std::future::Future;

use tracing::{debug, error, warn};

use crate::combinators::{RetryPlan, RollbackError};
use crate::error::{Classify, TaskError};

/// Suspending [`apply_with_rollback`](crate::combinators::apply_with_rollback).
///
/// Steps receive owned clones of the items.
pub async fn apply_with_rollback_async<I, E, RE, A, AF, R, RF>(
    items: &[I],
    mut apply: A,
    mut rollback: R,
) -> Result<(), RollbackError<E, RE>>
where
    I: Clone,
    A: FnMut(I) -> AF,
    AF: Future<Output = Result<(), E>>,
    R: FnMut(I) -> RF,
    RF: Future<Output = Result<(), RE>>,
    RE: Display,
{
    for (index, item) in items.iter().enumerate() {
        if let Err(err) = apply(item.clone()).await {
            warn!(index, rollbacks = index + 1, "apply failed, rolling back");
            let mut rollback_failures = Vec::new();
            for (undo, attempted) in items[..=index].iter().enumerate().rev() {
                if let Err(rollback_err) = rollback(attempted.clone()).await {
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

/// Suspending [`try_any`](crate::combinators::try_any).
pub async fn try_any_async<I, T, E, F, Fut>(
    items: impl IntoIterator<Item = I>,
    mut action: F,
) -> Result<T, E>
where
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TaskError> + Display,
{
    let mut last = None;
    for (index, item) in items.into_iter().enumerate() {
        match action(item).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                debug!(index, %err, "alternative failed");
                last = Some(err);
            }
        }
    }
    Err(last.unwrap_or_else(|| TaskError::validation("try_any needs at least one item").into()))
}

/// Suspending [`retry`](crate::combinators::retry). The delay between
/// attempts is a `tokio` sleep.
pub async fn retry_async<T, E, F, Fut>(plan: &RetryPlan, mut action: F) -> Result<T, E>
where
    F: FnMut(bool) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Classify + Display,
{
    let attempts = plan.attempts();
    let mut attempt = 1;
    loop {
        let is_last = attempt >= attempts;
        match action(is_last).await {
            Ok(value) => return Ok(value),
            Err(err) if !is_last && plan.matches(&err) => {
                debug!(attempt, attempts, %err, "retrying");
                if !plan.delay.is_zero() {
                    tokio::time::sleep(plan.delay).await;
                }
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
