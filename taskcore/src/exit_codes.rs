//! Stable exit codes for taskcore CLI commands.

use crate::error::{ErrorKind, TaskError};

/// Command succeeded (a declined `confirm` is not success, see [`DECLINED`]).
pub const OK: i32 = 0;
/// Invalid arguments or config, or an unclassified failure.
pub const ERROR: i32 = 1;
/// The operation was canceled, by signal or by the user.
pub const CANCELED: i32 = 2;
/// A wait ran out of time.
pub const TIMEOUT: i32 = 3;
pub const IO: i32 = 4;
pub const NETWORK: i32 = 5;
/// `taskcore confirm` was answered "no".
pub const DECLINED: i32 = 6;

/// Exit code for a task outcome.
pub fn for_outcome(outcome: &Result<(), TaskError>) -> i32 {
    match outcome {
        Ok(()) => OK,
        Err(err) if err.is_cancellation() => CANCELED,
        Err(err) => for_kind(err.kind()),
    }
}

pub fn for_kind(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Canceled => CANCELED,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::Io => IO,
        ErrorKind::Network => NETWORK,
        ErrorKind::Validation | ErrorKind::Unexpected => ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn outcomes_map_to_distinct_codes() {
        assert_eq!(for_outcome(&Ok(())), OK);
        assert_eq!(for_outcome(&Err(TaskError::Canceled)), CANCELED);
        assert_eq!(
            for_outcome(&Err(TaskError::Timeout(Duration::from_secs(1)))),
            TIMEOUT
        );
        assert_eq!(
            for_outcome(&Err(std::io::Error::other("disk").into())),
            IO
        );
        assert_eq!(for_outcome(&Err(TaskError::validation("x"))), ERROR);
    }

    #[test]
    fn wrapped_cancellation_still_counts_as_canceled() {
        let err = TaskError::from(anyhow::Error::new(TaskError::Canceled).context("step"));
        assert_eq!(for_outcome(&Err(err)), CANCELED);
    }
}
