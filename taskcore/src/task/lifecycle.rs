//! Task orchestration: one run, one classified terminal state.

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn};

use crate::cancel::CancellationToken;
use crate::credentials::CredentialProvider;
use crate::error::{ErrorKind, TaskError};
use crate::handler::ProgressSink;
use crate::task::body::{FnBody, TaskBody, TaskContext};
use crate::task::state::TaskState;

/// A named unit of cancellable, progress-reporting work.
///
/// The state is driven only by [`Task::run`]; a task runs at most once.
pub struct Task<B> {
    name: String,
    state: TaskState,
    units_total: Option<u64>,
    body: B,
}

impl<B: TaskBody> Task<B> {
    pub fn new(name: impl Into<String>, body: B) -> Self {
        Self {
            name: name.into(),
            state: TaskState::Pending,
            units_total: None,
            body,
        }
    }

    /// Total units of work, for determinate progress reporting.
    pub fn with_units_total(mut self, total: u64) -> Self {
        self.units_total = Some(total);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn units_total(&self) -> Option<u64> {
        self.units_total
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    /// Execute the body and classify its outcome.
    ///
    /// The state moves `Pending -> Running -> <terminal>`; the body's failure
    /// (if any) is returned unchanged after the state has been set. Running a
    /// task that is no longer pending is a validation error and leaves its
    /// state untouched.
    ///
    /// A body that fails with [`TaskError::Canceled`] ends in
    /// [`TaskState::Canceled`] even when `token` was never requested, e.g. a
    /// user who canceled a confirmation prompt inside the body.
    pub fn run(
        &mut self,
        token: &CancellationToken,
        credentials: &dyn CredentialProvider,
        progress: Option<&mut dyn ProgressSink>,
    ) -> Result<(), TaskError> {
        let span = info_span!("task", name = %self.name);
        let _enter = span.enter();

        if self.state != TaskState::Pending {
            return Err(TaskError::validation(format!(
                "task {} already ran (state {})",
                self.name, self.state
            )));
        }

        self.transition(TaskState::Running);
        let progress = progress.map(|sink| sink as &mut dyn ProgressSink);
        let mut ctx = TaskContext::new(
            &self.name,
            token,
            credentials,
            progress,
            self.units_total,
        );
        let outcome = self.body.execute(&mut ctx);
        let next = TaskState::from_outcome(&outcome);
        self.transition(next);

        match &outcome {
            Ok(()) => info!("task complete"),
            Err(err) if next == TaskState::Canceled => info!(%err, "task canceled"),
            Err(err) if matches!(err.kind(), ErrorKind::Io | ErrorKind::Network) => {
                warn!(state = %next, err = %err.chain_message(), "task failed");
            }
            Err(err) => error!(state = %next, err = %err.chain_message(), "task failed"),
        }
        outcome
    }

    fn transition(&mut self, next: TaskState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal task transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "task state");
        self.state = next;
    }
}

impl<F> Task<FnBody<F>>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<(), TaskError> + Send,
{
    /// Build a task whose body is a closure.
    pub fn from_fn(name: impl Into<String>, body: F) -> Self {
        Self::new(name, FnBody(body))
    }
}

impl<B> std::fmt::Debug for Task<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("units_total", &self.units_total)
            .finish_non_exhaustive()
    }
}

/// Serializable snapshot of a finished (or pending) task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub name: String,
    pub state: TaskState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskReport {
    pub fn new<B: TaskBody>(task: &Task<B>, outcome: Option<&TaskError>) -> Self {
        Self {
            name: task.name().to_string(),
            state: task.state(),
            error: outcome.map(TaskError::chain_message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationSource;
    use crate::credentials::NoCredentials;

    #[derive(Default)]
    struct Recorded(Vec<(u64, Option<u64>)>);

    impl ProgressSink for Recorded {
        fn report(&mut self, done: u64, total: Option<u64>) {
            self.0.push((done, total));
        }
    }

    fn run<B: TaskBody>(task: &mut Task<B>, token: &CancellationToken) -> Result<(), TaskError> {
        task.run(token, &NoCredentials, None)
    }

    #[test]
    fn successful_body_completes() {
        let mut task = Task::from_fn("noop", |_ctx| Ok(()));
        assert_eq!(task.state(), TaskState::Pending);

        run(&mut task, &CancellationToken::none()).expect("run");

        assert_eq!(task.state(), TaskState::Complete);
    }

    #[test]
    fn progress_is_reported_against_units_total() {
        let mut sink = Recorded::default();
        let mut task = Task::from_fn("copy", |ctx| {
            for done in 1..=3 {
                ctx.check_canceled()?;
                ctx.report_progress(done);
            }
            Ok(())
        })
        .with_units_total(3);

        task.run(&CancellationToken::none(), &NoCredentials, Some(&mut sink))
            .expect("run");

        assert_eq!(sink.0, vec![(1, Some(3)), (2, Some(3)), (3, Some(3))]);
    }

    #[test]
    fn cooperative_cancellation_yields_canceled() {
        let source = CancellationSource::new();
        let token = source.token();
        let mut task = Task::from_fn("loop", |ctx| {
            let mut steps = 0;
            loop {
                ctx.check_canceled()?;
                steps += 1;
                if steps == 3 {
                    source.cancel();
                }
            }
        });

        let err = run(&mut task, &token).expect_err("canceled");

        assert!(matches!(err, TaskError::Canceled));
        assert_eq!(task.state(), TaskState::Canceled);
    }

    #[test]
    fn canceled_body_without_requested_token_is_canceled() {
        let token = CancellationToken::none();
        let mut task = Task::from_fn("prompt", |_ctx| Err(TaskError::Canceled));

        let err = run(&mut task, &token).expect_err("canceled");

        assert!(!token.is_requested());
        assert!(matches!(err, TaskError::Canceled));
        assert_eq!(task.state(), TaskState::Canceled);
    }

    #[test]
    fn io_and_network_failures_get_their_own_states() {
        let mut io = Task::from_fn("io", |_ctx| Err(std::io::Error::other("disk full").into()));
        let err = run(&mut io, &CancellationToken::none()).expect_err("io");
        assert_eq!(io.state(), TaskState::IoError);
        assert_eq!(err.kind(), ErrorKind::Io);

        let mut net = Task::from_fn("net", |_ctx| {
            Err(TaskError::network(std::io::Error::other("reset")))
        });
        run(&mut net, &CancellationToken::none()).expect_err("net");
        assert_eq!(net.state(), TaskState::NetworkError);
    }

    #[test]
    fn other_failures_are_rethrown_unchanged() {
        let mut task = Task::from_fn("boom", |_ctx| {
            Err(anyhow::anyhow!("root cause").context("outer").into())
        });

        let err = run(&mut task, &CancellationToken::none()).expect_err("boom");

        assert_eq!(task.state(), TaskState::Error);
        assert_eq!(format!("{err:#}"), "outer: root cause");
    }

    #[test]
    fn completed_task_cannot_run_again() {
        let mut calls = 0;
        let mut task = Task::from_fn("once", |_ctx| {
            calls += 1;
            Ok(())
        });
        run(&mut task, &CancellationToken::none()).expect("first run");

        let err = run(&mut task, &CancellationToken::none()).expect_err("second run");

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(task.state(), TaskState::Complete);
        drop(task);
        assert_eq!(calls, 1);
    }

    #[test]
    fn report_captures_state_and_error() {
        let mut task = Task::from_fn("fail", |_ctx| Err(TaskError::validation("no url")));
        let err = run(&mut task, &CancellationToken::none()).expect_err("fail");

        let report = TaskReport::new(&task, Some(&err));

        assert_eq!(report.state, TaskState::Error);
        assert_eq!(report.error.as_deref(), Some("invalid argument: no url"));
        let json = serde_json::to_string(&report).expect("json");
        assert!(json.contains("\"state\":\"error\""));
    }
}
