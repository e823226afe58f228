// Execution Events
// Progress lines and terminal results streamed while executions run

use crate::execution::result::ExecutionResult;

use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Sender for progress lines
pub type ProgressSender = mpsc::UnboundedSender<ProgressLine>;

/// Receiver for progress lines
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressLine>;

/// Sender for terminal results
pub type ResultSender = mpsc::UnboundedSender<ExecutionResult>;

/// Receiver for terminal results
pub type ResultReceiver = mpsc::UnboundedReceiver<ExecutionResult>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Create a new result channel
pub fn result_channel() -> (ResultSender, ResultReceiver) {
    mpsc::unbounded_channel()
}

/// One line of free-form output from an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressLine {
    /// Module the line belongs to
    pub module: String,
    pub line: String,
    /// Line came from stderr
    pub is_error: bool,
}

impl fmt::Display for ProgressLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.module, self.line)
    }
}

/// Progress writer bound to a single module
///
/// Lines from one sink keep their order; lines from different sinks
/// interleave arbitrarily.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    module: Arc<str>,
    tx: Option<ProgressSender>,
}

impl ProgressSink {
    pub fn new(module: &str, tx: ProgressSender) -> Self {
        Self {
            module: Arc::from(module),
            tx: Some(tx),
        }
    }

    /// A sink that drops every line
    pub fn discard(module: &str) -> Self {
        Self {
            module: Arc::from(module),
            tx: None,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn line(&self, line: impl Into<String>) {
        self.emit(line.into(), false);
    }

    pub fn error_line(&self, line: impl Into<String>) {
        self.emit(line.into(), true);
    }

    fn emit(&self, line: String, is_error: bool) {
        self.tx.send_event(ProgressLine {
            module: self.module.to_string(),
            line,
            is_error,
        });
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender<T> {
    fn send_event(&self, event: T);
}

impl<T> EventSender<T> for mpsc::UnboundedSender<T> {
    fn send_event(&self, event: T) {
        let _ = self.send(event);
    }
}

impl<T> EventSender<T> for Option<mpsc::UnboundedSender<T>> {
    fn send_event(&self, event: T) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
