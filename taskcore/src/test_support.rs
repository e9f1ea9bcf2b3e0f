//! Test-only doubles for the handler's collaborators.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::credentials::{Credential, CredentialSource};
use crate::error::TaskError;
use crate::handler::{Answer, ProgressFactory, ProgressSink, Table, UserInterface};

/// [`CredentialSource`] backed by a fixed list, counting lookups.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    entries: Vec<(String, String, Credential)>,
    lookups: AtomicUsize,
}

impl StaticCredentials {
    pub fn with(mut self, origin: &str, scheme: &str, credential: Credential) -> Self {
        self.entries
            .push((origin.to_string(), scheme.to_string(), credential));
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, origin: &str, scheme: &str) -> Option<Credential> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.entries
            .iter()
            .find(|(o, s, _)| o == origin && s == scheme)
            .map(|(_, _, credential)| credential.clone())
    }
}

/// [`UserInterface`] that answers from a script and records everything shown.
///
/// An exhausted script answers [`Answer::Cancel`].
#[derive(Debug, Default)]
pub struct ScriptedUi {
    answers: Mutex<VecDeque<Answer>>,
    questions: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
    tables: Mutex<Vec<(String, Table)>>,
    errors: Mutex<Vec<String>>,
}

impl ScriptedUi {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn questions(&self) -> Vec<String> {
        lock(&self.questions).clone()
    }

    pub fn outputs(&self) -> Vec<(String, String)> {
        lock(&self.outputs).clone()
    }

    pub fn tables(&self) -> Vec<(String, Table)> {
        lock(&self.tables).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }
}

impl UserInterface for ScriptedUi {
    fn ask(&self, question: &str) -> Answer {
        lock(&self.questions).push(question.to_string());
        lock(&self.answers).pop_front().unwrap_or(Answer::Cancel)
    }

    fn output(&self, title: &str, message: &str) {
        lock(&self.outputs).push((title.to_string(), message.to_string()));
    }

    fn output_table(&self, title: &str, table: &Table) {
        lock(&self.tables).push((title.to_string(), table.clone()));
    }

    fn report_error(&self, error: &TaskError) {
        lock(&self.errors).push(error.chain_message());
    }
}

/// One call seen by a [`RecordingProgress`] factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Created { task: String, total: Option<u64> },
    Reported { task: String, done: u64 },
    Dropped { task: String },
}

/// [`ProgressFactory`] whose sinks record creation, reports and drop.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }

    pub fn created(&self) -> usize {
        self.count(|event| matches!(event, ProgressEvent::Created { .. }))
    }

    pub fn dropped(&self) -> usize {
        self.count(|event| matches!(event, ProgressEvent::Dropped { .. }))
    }

    fn count(&self, pred: impl Fn(&ProgressEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|event| pred(*event)).count()
    }
}

impl ProgressFactory for RecordingProgress {
    fn create(&self, task: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        lock(&self.events).push(ProgressEvent::Created {
            task: task.to_string(),
            total,
        });
        Box::new(RecordingSink {
            task: task.to_string(),
            events: Arc::clone(&self.events),
        })
    }
}

struct RecordingSink {
    task: String,
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl ProgressSink for RecordingSink {
    fn report(&mut self, done: u64, _total: Option<u64>) {
        lock(&self.events).push(ProgressEvent::Reported {
            task: self.task.clone(),
            done,
        });
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        lock(&self.events).push(ProgressEvent::Dropped {
            task: self.task.clone(),
        });
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
///
/// Captures every level down to `debug`, without ANSI colors.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    (value, buffer.contents())
}

#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
