//! The work a task performs and the context it runs with.

use crate::cancel::CancellationToken;
use crate::credentials::CredentialProvider;
use crate::error::TaskError;
use crate::handler::ProgressSink;

/// Unit of work executed by a [`Task`](crate::task::Task).
///
/// Bodies should poll [`TaskContext::check_canceled`] between steps and
/// return [`TaskError::Canceled`] when asked to stop.
pub trait TaskBody: Send {
    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError>;
}

/// Adapter that lets a closure act as a [`TaskBody`].
pub struct FnBody<F>(pub F);

impl<F> TaskBody for FnBody<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<(), TaskError> + Send,
{
    fn execute(&mut self, ctx: &mut TaskContext<'_>) -> Result<(), TaskError> {
        (self.0)(ctx)
    }
}

/// Everything a body may use while it runs.
pub struct TaskContext<'a> {
    name: &'a str,
    token: &'a CancellationToken,
    credentials: &'a dyn CredentialProvider,
    progress: Option<&'a mut dyn ProgressSink>,
    units_total: Option<u64>,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(
        name: &'a str,
        token: &'a CancellationToken,
        credentials: &'a dyn CredentialProvider,
        progress: Option<&'a mut dyn ProgressSink>,
        units_total: Option<u64>,
    ) -> Self {
        Self {
            name,
            token,
            credentials,
            progress,
            units_total,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn token(&self) -> &CancellationToken {
        self.token
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_requested()
    }

    pub fn check_canceled(&self) -> Result<(), TaskError> {
        self.token.check()
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials
    }

    /// Forward progress to the sink, if the run has one.
    ///
    /// The total is the task's `units_total`; `None` means indeterminate.
    pub fn report_progress(&mut self, done: u64) {
        if let Some(sink) = self.progress.as_deref_mut() {
            sink.report(done, self.units_total);
        }
    }
}
