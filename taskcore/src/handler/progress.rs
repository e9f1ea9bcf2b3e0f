//! Progress sinks created per task run.

use tracing::info;

/// Receives progress updates for one task run.
///
/// Sinks are created before a run and dropped after it, whatever the
/// outcome; a sink may be dropped without ever seeing a final report.
pub trait ProgressSink: Send {
    /// `total` is `None` when the amount of work is unknown.
    fn report(&mut self, done: u64, total: Option<u64>);
}

/// Creates a [`ProgressSink`] for each task run.
pub trait ProgressFactory: Send + Sync {
    fn create(&self, task: &str, total: Option<u64>) -> Box<dyn ProgressSink>;
}

/// Factory for [`TracingProgress`] sinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressFactory;

impl ProgressFactory for TracingProgressFactory {
    fn create(&self, task: &str, total: Option<u64>) -> Box<dyn ProgressSink> {
        Box::new(TracingProgress::new(task, total))
    }
}

/// Logs progress through `tracing`, at most once per whole percent.
///
/// Indeterminate progress is logged for every report.
#[derive(Debug)]
pub struct TracingProgress {
    task: String,
    last_percent: Option<u64>,
}

impl TracingProgress {
    pub fn new(task: &str, total: Option<u64>) -> Self {
        info!(task, total = ?total, "task started");
        Self {
            task: task.to_string(),
            last_percent: None,
        }
    }
}

impl ProgressSink for TracingProgress {
    fn report(&mut self, done: u64, total: Option<u64>) {
        let Some(total) = total.filter(|t| *t > 0) else {
            info!(task = %self.task, done, "progress");
            return;
        };
        let percent = done.min(total).saturating_mul(100) / total;
        if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            info!(task = %self.task, done, total, percent, "progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_only_tracked_on_change() {
        let mut sink = TracingProgress::new("copy", Some(1000));
        sink.report(1, Some(1000));
        assert_eq!(sink.last_percent, Some(0));
        sink.report(9, Some(1000));
        assert_eq!(sink.last_percent, Some(0));
        sink.report(10, Some(1000));
        assert_eq!(sink.last_percent, Some(1));
        sink.report(5000, Some(1000));
        assert_eq!(sink.last_percent, Some(100));
    }

    #[test]
    fn indeterminate_progress_leaves_percent_alone() {
        let mut sink = TracingProgress::new("scan", None);
        sink.report(3, None);
        sink.report(4, Some(0));
        assert_eq!(sink.last_percent, None);
    }
}
