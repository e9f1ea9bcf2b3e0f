//! Task orchestration: verbosity policy, progress sinks and the user
//! interface surface.

mod progress;
mod task_handler;
mod ui;

pub use progress::{ProgressFactory, ProgressSink, TracingProgress, TracingProgressFactory};
pub use task_handler::{TaskHandler, Verbosity};
pub use ui::{Answer, Table, UserInterface};
