//! End-to-end runs through a `TaskHandler`.
//!
//! These tests wire real tasks to the test-support doubles and check what
//! the handler's collaborators observe: progress sink lifecycle, credential
//! lookups, confirmation answers and cancellation from other threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use taskcore::credentials::{Credential, CredentialCache};
use taskcore::error::{ErrorKind, TaskError};
use taskcore::handler::{Answer, TaskHandler, Verbosity};
use taskcore::task::{Signal, Task, TaskState, WaitTask};
use taskcore::test_support::{
    ProgressEvent, RecordingProgress, ScriptedUi, StaticCredentials, capture_logs,
};

const LONG: Duration = Duration::from_secs(10);
const ORIGIN: &str = "https://pkgs.example/feed";

fn recorded_handler(
    ui: &Arc<ScriptedUi>,
    progress: &Arc<RecordingProgress>,
    verbosity: Verbosity,
) -> TaskHandler {
    TaskHandler::new(Arc::clone(ui), verbosity).with_progress(Arc::clone(progress))
}

#[test]
fn progress_sink_lives_for_exactly_one_successful_run() {
    let ui = Arc::new(ScriptedUi::default());
    let progress = Arc::new(RecordingProgress::default());
    let handler = recorded_handler(&ui, &progress, Verbosity::Normal);
    let mut task = Task::from_fn("copy", |ctx| {
        for done in 1..=2 {
            ctx.check_canceled()?;
            ctx.report_progress(done);
        }
        Ok(())
    })
    .with_units_total(2);

    handler.run_task(&mut task).expect("run");

    assert_eq!(task.state(), TaskState::Complete);
    assert_eq!(
        progress.events(),
        vec![
            ProgressEvent::Created {
                task: "copy".to_string(),
                total: Some(2)
            },
            ProgressEvent::Reported {
                task: "copy".to_string(),
                done: 1
            },
            ProgressEvent::Reported {
                task: "copy".to_string(),
                done: 2
            },
            ProgressEvent::Dropped {
                task: "copy".to_string()
            },
        ]
    );
}

#[test]
fn progress_sink_is_dropped_when_the_task_fails() {
    let ui = Arc::new(ScriptedUi::default());
    let progress = Arc::new(RecordingProgress::default());
    let handler = recorded_handler(&ui, &progress, Verbosity::Detailed);
    let mut task = Task::from_fn("write", |_ctx| {
        Err(std::io::Error::other("disk full").into())
    });

    let err = handler.run_task(&mut task).expect_err("io failure");

    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(task.state(), TaskState::IoError);
    assert_eq!(progress.created(), 1);
    assert_eq!(progress.dropped(), 1);
}

#[test]
fn batch_mode_runs_without_progress() {
    let ui = Arc::new(ScriptedUi::default());
    let progress = Arc::new(RecordingProgress::default());
    let handler = recorded_handler(&ui, &progress, Verbosity::Batch);
    let mut task = Task::from_fn("quiet", |ctx| {
        ctx.report_progress(1);
        Ok(())
    })
    .with_units_total(1);

    handler.run_task(&mut task).expect("run");

    assert_eq!(task.state(), TaskState::Complete);
    assert!(progress.events().is_empty());
}

#[test]
fn tasks_share_the_handler_credential_cache() {
    let source =
        StaticCredentials::default().with(ORIGIN, "basic", Credential::new("ci", "token-1"));
    let cache = Arc::new(CredentialCache::new(source));
    let ui = Arc::new(ScriptedUi::default());
    let handler = TaskHandler::new(ui, Verbosity::Batch).with_credentials(Arc::clone(&cache));

    let mut fetch = Task::from_fn("fetch", |ctx| {
        let first = ctx.credentials().get_credential(ORIGIN, "basic")?;
        let second = ctx.credentials().get_credential(ORIGIN, "basic")?;
        assert_eq!(first, second);
        ctx.credentials().report_invalid(ORIGIN);
        Ok(())
    });
    handler.run_task(&mut fetch).expect("fetch");

    let mut refetch = Task::from_fn("refetch", |ctx| {
        let credential = ctx
            .credentials()
            .get_credential(ORIGIN, "basic")?
            .ok_or_else(|| TaskError::validation("no credential"))?;
        assert_eq!(credential.secret(), "token-1");
        Ok(())
    });
    handler.run_task(&mut refetch).expect("refetch");

    assert_eq!(cache.source().lookups(), 2);
    assert!(!cache.invalid_origins().contains(ORIGIN));
}

#[test]
fn empty_origin_fails_the_task_with_validation() {
    let ui = Arc::new(ScriptedUi::default());
    let handler = TaskHandler::new(ui, Verbosity::Batch);
    let mut task = Task::from_fn("fetch", |ctx| {
        ctx.credentials().get_credential("", "basic")?;
        Ok(())
    });

    let err = handler.run_task(&mut task).expect_err("validation");

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(task.state(), TaskState::Error);
}

#[test]
fn cancel_from_another_thread_ends_a_wait() {
    let ui = Arc::new(ScriptedUi::default());
    let handler = Arc::new(TaskHandler::new(ui, Verbosity::Batch));
    let mut task = WaitTask::waiting_on("ready", Arc::new(Signal::new()), Some(LONG));
    let canceler = {
        let handler = Arc::clone(&handler);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handler.cancel();
        })
    };

    let err = handler.run_task(&mut task).expect_err("canceled");

    assert!(err.is_cancellation());
    assert_eq!(task.state(), TaskState::Canceled);
    canceler.join().expect("join");
}

#[test]
fn declining_to_decide_cancels_the_task() {
    let ui = Arc::new(ScriptedUi::new([Answer::Cancel]));
    let progress = Arc::new(RecordingProgress::default());
    let handler = recorded_handler(&ui, &progress, Verbosity::Normal);
    let mut task = Task::from_fn("cleanup", |_ctx| {
        if handler.ask("delete 3 files?")? {
            return Err(TaskError::validation("should not proceed"));
        }
        Ok(())
    });

    let err = handler.run_task(&mut task).expect_err("canceled");
    handler.report_error(&err);

    assert_eq!(task.state(), TaskState::Canceled);
    assert_eq!(ui.questions(), vec!["delete 3 files?".to_string()]);
    assert!(ui.errors().is_empty());
    assert_eq!(progress.dropped(), 1);
}

#[test]
fn answering_no_lets_the_task_complete() {
    let ui = Arc::new(ScriptedUi::new([Answer::No]));
    let handler = TaskHandler::new(Arc::clone(&ui), Verbosity::Batch);
    let mut deleted = false;
    let mut task = Task::from_fn("cleanup", |_ctx| {
        deleted = handler.ask("delete?")?;
        Ok(())
    });

    handler.run_task(&mut task).expect("run");

    assert_eq!(task.state(), TaskState::Complete);
    drop(task);
    assert!(!deleted);
}

#[test]
fn failures_reach_the_user_interface() {
    let ui = Arc::new(ScriptedUi::default());
    let handler = TaskHandler::new(Arc::clone(&ui), Verbosity::Batch);
    let mut task = Task::from_fn("upload", |_ctx| {
        Err(TaskError::network(std::io::Error::other("connection reset")))
    });

    let err = handler.run_task(&mut task).expect_err("network");
    handler.report_error(&err);

    assert_eq!(task.state(), TaskState::NetworkError);
    assert_eq!(ui.errors(), vec!["network failure: connection reset".to_string()]);
}

#[test]
fn abandoned_wait_completes_with_a_warning() {
    let ui = Arc::new(ScriptedUi::default());
    let handler = TaskHandler::new(ui, Verbosity::Batch);
    let signal = Arc::new(Signal::new());
    signal.abandon();
    let mut task = WaitTask::waiting_on("lock", signal, Some(LONG));

    let (outcome, logs) = capture_logs(|| handler.run_task(&mut task));

    outcome.expect("abandonment is not a failure");
    assert_eq!(task.state(), TaskState::Complete);
    assert!(logs.contains("WARN"), "logs: {logs}");
    assert!(logs.contains("abandoned"), "logs: {logs}");
}

#[test]
fn independent_tasks_run_concurrently_through_one_handler() {
    let ui = Arc::new(ScriptedUi::default());
    let progress = Arc::new(RecordingProgress::default());
    let handler = recorded_handler(&ui, &progress, Verbosity::Normal);
    let signal = Arc::new(Signal::new());

    let states = thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            let mut task = WaitTask::waiting_on("wait", signal.clone(), Some(LONG));
            handler.run_task(&mut task).map(|()| task.state())
        });
        let setter = scope.spawn(|| {
            let mut task = Task::from_fn("set", |_ctx| {
                signal.set();
                Ok(())
            });
            handler.run_task(&mut task).map(|()| task.state())
        });
        (
            waiter.join().expect("join waiter"),
            setter.join().expect("join setter"),
        )
    });

    assert_eq!(states.0.expect("wait"), TaskState::Complete);
    assert_eq!(states.1.expect("set"), TaskState::Complete);
    assert_eq!(progress.created(), 2);
    assert_eq!(progress.dropped(), 2);
}

#[test]
fn cancel_waits_for_a_guarded_section_inside_a_task() {
    let ui = Arc::new(ScriptedUi::default());
    let handler = Arc::new(TaskHandler::new(ui, Verbosity::Batch));
    let finished = Arc::new(AtomicBool::new(false));
    let (started_tx, started_rx) = mpsc::channel();

    let worker = {
        let handler = Arc::clone(&handler);
        let finished = Arc::clone(&finished);
        thread::spawn(move || {
            let mut task = Task::from_fn("commit", move |ctx| {
                let guard = ctx.token().guard(None);
                started_tx.send(()).expect("send started");
                assert!(ctx.token().wait(Some(LONG)));
                thread::sleep(Duration::from_millis(30));
                finished.store(true, Ordering::SeqCst);
                drop(guard);
                ctx.check_canceled()
            });
            let outcome = handler.run_task(&mut task);
            (outcome.is_err(), task.state())
        })
    };

    started_rx.recv().expect("task started");
    handler.cancel();

    assert!(finished.load(Ordering::SeqCst));
    let (failed, state) = worker.join().expect("join");
    assert!(failed);
    assert_eq!(state, TaskState::Canceled);
}
