// Rendering of execution streams

use crate::output;

use colony_service::execution::ExecutionStreams;
use colony_service::{ExecutionResult, ExecutionStatus, ProgressLine, SkipReason};

use std::time::Duration;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;

enum StreamItem {
    Progress(ProgressLine),
    Result(ExecutionResult),
}

/// Tally of terminal results
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Skipped because the run was interrupted; also counted in `skipped`
    pub cancelled: usize,
    pub changed: Vec<String>,
}

/// Exit code of a run interrupted with Ctrl-C
pub const EXIT_INTERRUPTED: i32 = 130;

impl Summary {
    pub fn record(&mut self, result: &ExecutionResult) {
        match result.status {
            ExecutionStatus::Succeeded => self.succeeded += 1,
            ExecutionStatus::Failed(_) => self.failed += 1,
            ExecutionStatus::Skipped(SkipReason::Cancelled) => {
                self.skipped += 1;
                self.cancelled += 1;
            }
            ExecutionStatus::Skipped(_) => self.skipped += 1,
        }
        if result.changes == Some(true) {
            self.changed.push(result.module.clone());
        }
    }

    /// Process exit code: 1 when anything failed, 130 when the run was
    /// interrupted, 0 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else if self.cancelled > 0 {
            EXIT_INTERRUPTED
        } else {
            0
        }
    }
}

/// Print both streams as they arrive and return the tally
pub async fn render(streams: ExecutionStreams) -> Summary {
    let (progress, results, handle) = streams.into_parts();
    let mut merged = UnboundedReceiverStream::new(progress)
        .map(StreamItem::Progress)
        .merge(UnboundedReceiverStream::new(results).map(StreamItem::Result));

    let mut summary = Summary::default();
    while let Some(item) = merged.next().await {
        match item {
            StreamItem::Progress(line) if line.is_error => output::module_error(&line.module, &line.line),
            StreamItem::Progress(line) => output::module_line(&line.module, &line.line),
            StreamItem::Result(result) => {
                print_result(&result);
                summary.record(&result);
            }
        }
    }

    if let Err(e) = handle.await {
        output::error(&format!("execution driver failed: {e}"));
    }
    summary
}

fn print_result(result: &ExecutionResult) {
    let line = describe(result);
    match result.status {
        ExecutionStatus::Succeeded => output::success(&line),
        ExecutionStatus::Failed(_) => output::failure(&line),
        ExecutionStatus::Skipped(_) => output::skipped(&line),
    }
}

/// One-line description of a terminal result
pub fn describe(result: &ExecutionResult) -> String {
    match &result.status {
        ExecutionStatus::Succeeded => {
            let changes = match result.changes {
                Some(true) => ", changes pending",
                Some(false) => ", no changes",
                None => "",
            };
            format!(
                "{} {} ({}{changes})",
                result.module,
                result.operation,
                format_duration(result.duration)
            )
        }
        ExecutionStatus::Failed(error) => {
            format!("{} {} failed: {error}", result.module, result.operation)
        }
        ExecutionStatus::Skipped(reason) => {
            format!("{} {} skipped: {reason}", result.module, result.operation)
        }
    }
}

pub fn print_summary(summary: &Summary) {
    let line = format!(
        "{} succeeded, {} failed, {} skipped",
        summary.succeeded, summary.failed, summary.skipped
    );
    if summary.failed > 0 {
        output::header(&format!("Finished with failures: {line}"));
    } else {
        output::header(&format!("Finished: {line}"));
    }
    if summary.cancelled > 0 {
        output::warning(&format!("{} modules not started: interrupted", summary.cancelled));
    }
    if !summary.changed.is_empty() {
        output::dim(&format!("  changes pending in: {}", summary.changed.join(", ")));
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 60 {
        format!("{}m{:02}s", duration.as_secs() / 60, duration.as_secs() % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
