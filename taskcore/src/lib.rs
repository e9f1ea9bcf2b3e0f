//! Cooperative task execution and cancellation.
//!
//! - **[`cancel`]**: cancellation sources, tokens, observer links and guards.
//! - **[`task`]**: the task state machine and the stock [`task::WaitTask`].
//! - **[`combinators`]**: rollback, first-success and retry composition, in
//!   blocking and `async` flavors.
//! - **[`credentials`]**: memoized credential lookup with invalidation.
//! - **[`handler`]**: the [`handler::TaskHandler`] that runs tasks with a
//!   token, credentials and progress reporting wired in.
//!
//! [`config`], [`logging`] and [`exit_codes`] back the `taskcore` binary.

pub mod cancel;
pub mod combinators;
pub mod config;
pub mod credentials;
pub mod error;
pub mod exit_codes;
pub mod handler;
pub mod logging;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{ErrorKind, TaskError};
