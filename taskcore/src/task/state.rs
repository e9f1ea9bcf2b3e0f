//! Task lifecycle states and the edges between them.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, TaskError};

/// Lifecycle state of a [`Task`](crate::task::Task).
///
/// ```text
/// Pending -> Running -> Complete | Canceled | IoError | NetworkError | Error
/// ```
///
/// Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Complete,
    Canceled,
    IoError,
    NetworkError,
    Error,
}

impl TaskState {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }

    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running),
            Self::Running => next.is_terminal(),
            _ => false,
        }
    }

    /// Terminal state for the outcome of a task body.
    ///
    /// A cancellation signal wins over every other classification.
    pub fn from_outcome<T>(outcome: &Result<T, TaskError>) -> Self {
        let Err(err) = outcome else {
            return Self::Complete;
        };
        if err.is_cancellation() {
            return Self::Canceled;
        }
        match err.kind() {
            ErrorKind::Io => Self::IoError,
            ErrorKind::Network => Self::NetworkError,
            _ => Self::Error,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Canceled => "canceled",
            Self::IoError => "io_error",
            Self::NetworkError => "network_error",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
