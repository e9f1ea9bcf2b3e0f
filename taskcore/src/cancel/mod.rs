//! Cooperative cancellation: sources, tokens, links and guards.
//!
//! A [`CancellationSource`] owns a one-shot signal; [`CancellationToken`]s
//! observe it without owning it. Cancellation is cooperative: running work
//! polls [`CancellationToken::is_requested`] (or registers an observer) and
//! stops on its own terms.

mod guard;
mod link;
mod source;

pub use guard::CancellationGuard;
pub use link::{CancelLink, LinkClosed};
pub use source::{CancellationSource, CancellationToken, Registration};
