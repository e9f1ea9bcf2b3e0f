//! Failure taxonomy shared by tasks, combinators and the handler.
//!
//! Every failure the core produces or classifies is a [`TaskError`]. The
//! coarse [`ErrorKind`] tag is what task classification and retry matching
//! look at; callers never need to inspect concrete error types at runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error used for failures that come from outside the core.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Cooperative cancellation. A control-flow signal, not a fault.
    Canceled,
    Timeout,
    Io,
    Network,
    /// Caller misuse (empty or missing required argument).
    Validation,
    Unexpected,
}

impl ErrorKind {
    /// Whether a failure of this kind may be attempted again.
    ///
    /// Cancellation and caller misuse never are, regardless of what a retry
    /// plan asks for.
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Canceled | Self::Validation)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Canceled => "canceled",
            Self::Timeout => "timeout",
            Self::Io => "io",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Unexpected => "unexpected",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure raised by a task body, a combinator step or the handler.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("operation canceled")]
    Canceled,

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("i/o failure")]
    Io(#[from] std::io::Error),

    #[error("network failure")]
    Network(#[source] BoxError),

    #[error("invalid argument: {0}")]
    Validation(String),

    /// Anything else. Display and source delegate to the wrapped error so
    /// the original context chain survives the rethrow.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl TaskError {
    pub fn network(err: impl Into<BoxError>) -> Self {
        Self::Network(err.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Canceled => ErrorKind::Canceled,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Io(_) => ErrorKind::Io,
            Self::Network(_) => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    /// This error's message followed by each of its sources, `: `-separated.
    pub fn chain_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }

    /// True for a cancellation signal, including one that was wrapped into
    /// an [`anyhow::Error`] on its way up.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Canceled => true,
            Self::Unexpected(err) => err
                .downcast_ref::<TaskError>()
                .is_some_and(TaskError::is_cancellation),
            _ => false,
        }
    }
}

/// Explicit kind tag used by retry matching.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

impl Classify for TaskError {
    fn kind(&self) -> ErrorKind {
        TaskError::kind(self)
    }
}

impl Classify for std::io::Error {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}
