//! Runs tasks with cancellation, credentials and progress wired in.

use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::{CancellationSource, CancellationToken};
use crate::credentials::{CredentialProvider, NoCredentials};
use crate::error::TaskError;
use crate::handler::progress::{ProgressFactory, TracingProgressFactory};
use crate::handler::ui::{Answer, Table, UserInterface};
use crate::task::{Task, TaskBody};

/// How much a handler reports while tasks run.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Unattended runs: no progress reporting at all.
    Batch,
    #[default]
    Normal,
    Detailed,
}

/// Owns the cancellation source for a set of task runs and supplies each
/// run with a token, credentials and (outside batch mode) a progress sink.
///
/// Every method takes `&self`; independent tasks may run concurrently on
/// different threads through one handler.
pub struct TaskHandler {
    source: CancellationSource,
    credentials: Arc<dyn CredentialProvider>,
    progress: Arc<dyn ProgressFactory>,
    ui: Arc<dyn UserInterface>,
    verbosity: Verbosity,
}

impl TaskHandler {
    pub fn new<U: UserInterface + 'static>(ui: Arc<U>, verbosity: Verbosity) -> Self {
        Self {
            source: CancellationSource::new(),
            credentials: Arc::new(NoCredentials),
            progress: Arc::new(TracingProgressFactory),
            ui,
            verbosity,
        }
    }

    pub fn with_credentials<P: CredentialProvider + 'static>(mut self, provider: Arc<P>) -> Self {
        self.credentials = provider;
        self
    }

    pub fn with_progress<F: ProgressFactory + 'static>(mut self, factory: Arc<F>) -> Self {
        self.progress = factory;
        self
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn token(&self) -> CancellationToken {
        self.source.token()
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    /// Cancel every task run through this handler. See
    /// [`CancellationSource::cancel`].
    pub fn cancel(&self) {
        self.source.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.source.is_requested()
    }

    /// Run `task` to a terminal state and return its outcome.
    ///
    /// In batch mode the task gets no progress sink. Otherwise a sink is
    /// created for this run and dropped when it ends, whatever the outcome.
    pub fn run_task<B: TaskBody>(&self, task: &mut Task<B>) -> Result<(), TaskError> {
        let token = self.source.token();
        debug!(task = task.name(), verbosity = ?self.verbosity, "running task");
        if self.verbosity == Verbosity::Batch {
            return task.run(&token, self.credentials.as_ref(), None);
        }
        let mut sink = self.progress.create(task.name(), task.units_total());
        task.run(&token, self.credentials.as_ref(), Some(sink.as_mut()))
    }

    /// Ask a yes/no question.
    ///
    /// A user who cancels instead of answering, or a cancellation that is
    /// already pending, yields [`TaskError::Canceled`].
    pub fn ask(&self, question: &str) -> Result<bool, TaskError> {
        self.source.token().check()?;
        let answer = self.ui.ask(question);
        debug!(question, ?answer, "user answered");
        match answer {
            Answer::Yes => Ok(true),
            Answer::No => Ok(false),
            Answer::Cancel => Err(TaskError::Canceled),
        }
    }

    pub fn output(&self, title: &str, message: &str) {
        self.ui.output(title, message);
    }

    pub fn output_table(&self, title: &str, table: &Table) {
        self.ui.output_table(title, table);
    }

    /// Report a failure to the user. Cancellation is not a failure and is
    /// only logged.
    pub fn report_error(&self, error: &TaskError) {
        if error.is_cancellation() {
            info!("operation canceled");
            return;
        }
        self.ui.report_error(error);
    }
}

impl std::fmt::Debug for TaskHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandler")
            .field("source", &self.source)
            .field("verbosity", &self.verbosity)
            .finish_non_exhaustive()
    }
}
