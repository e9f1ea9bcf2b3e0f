//! Tasks: named, cancellable, progress-reporting units of work.
//!
//! A [`Task`] wraps a [`TaskBody`] and drives it through the [`TaskState`]
//! machine exactly once. [`WaitTask`] is the stock task that waits on an
//! external [`Signal`].

mod body;
mod lifecycle;
mod state;
mod wait;

pub use body::{FnBody, TaskBody, TaskContext};
pub use lifecycle::{Task, TaskReport};
pub use state::TaskState;
pub use wait::{Signal, SignalOutcome, Subscription, WaitForSignal, WaitTarget, WaitTask};
