// Execution Results
// Terminal outcome of running one bound execution

use crate::execution::binder::BoundExecution;
use crate::runners::{RunnerError, RunnerStep};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Operation requested of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Plan,
    Apply,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Plan => write!(f, "plan"),
            Operation::Apply => write!(f, "apply"),
        }
    }
}

/// Why an execution was not run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// An upstream module failed; names the module that failed
    DependencyFailed { dependency: String },
    /// The caller aborted before the execution started
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DependencyFailed { dependency } => {
                write!(f, "dependency '{}' failed", dependency)
            }
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Execution-time failure, always attributed to one execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("failed to resolve terraform {version}: {reason}")]
    VersionResolutionFailed { version: String, reason: String },

    #[error("terraform {step} failed with exit code {}", display_code(.exit_code))]
    ExecutionFailed {
        step: RunnerStep,
        exit_code: Option<i32>,
    },

    /// Terminated by cancellation; the module's state file is authoritative
    #[error("terraform {step} was interrupted")]
    Interrupted { step: RunnerStep },

    #[error("terraform {step} could not run: {message}")]
    Runner { step: RunnerStep, message: String },

    #[error("failed to prepare working directory: {0}")]
    Workspace(String),

    #[error("execution task aborted: {0}")]
    Aborted(String),
}

fn display_code(code: &Option<i32>) -> String {
    code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

impl From<RunnerError> for ExecutionError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Failed { step, exit_code } => Self::ExecutionFailed { step, exit_code },
            RunnerError::Interrupted { step } => Self::Interrupted { step },
            RunnerError::Spawn { step, .. } | RunnerError::Io { step, .. } => Self::Runner {
                step,
                message: err.to_string(),
            },
        }
    }
}

/// Terminal status of an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Failed(ExecutionError),
    Skipped(SkipReason),
}

/// Result of running one bound execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub module: String,
    pub operation: Operation,
    /// Variables the execution was bound with
    pub variables: BTreeMap<String, String>,
    pub status: ExecutionStatus,
    pub duration: Duration,
    /// Whether a plan reported pending changes
    pub changes: Option<bool>,
}

impl ExecutionResult {
    pub fn succeeded(
        execution: &BoundExecution,
        operation: Operation,
        duration: Duration,
        changes: Option<bool>,
    ) -> Self {
        Self::new(execution, operation, ExecutionStatus::Succeeded, duration, changes)
    }

    pub fn failed(
        execution: &BoundExecution,
        operation: Operation,
        error: ExecutionError,
        duration: Duration,
    ) -> Self {
        Self::new(execution, operation, ExecutionStatus::Failed(error), duration, None)
    }

    pub fn skipped(execution: &BoundExecution, operation: Operation, reason: SkipReason) -> Self {
        Self::new(
            execution,
            operation,
            ExecutionStatus::Skipped(reason),
            Duration::ZERO,
            None,
        )
    }

    fn new(
        execution: &BoundExecution,
        operation: Operation,
        status: ExecutionStatus,
        duration: Duration,
        changes: Option<bool>,
    ) -> Self {
        Self {
            module: execution.name().to_string(),
            operation,
            variables: execution.variables().clone(),
            status,
            duration,
            changes,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    pub fn error(&self) -> Option<&ExecutionError> {
        match &self.status {
            ExecutionStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ExecutionError::ExecutionFailed {
            step: RunnerStep::Apply,
            exit_code: Some(1),
        };
        assert_eq!(err.to_string(), "terraform apply failed with exit code 1");

        let err = ExecutionError::ExecutionFailed {
            step: RunnerStep::Init,
            exit_code: None,
        };
        assert_eq!(err.to_string(), "terraform init failed with exit code none");
    }

    #[test]
    fn test_runner_error_conversion() {
        let err: ExecutionError = RunnerError::Interrupted {
            step: RunnerStep::Plan,
        }
        .into();
        assert_eq!(err, ExecutionError::Interrupted { step: RunnerStep::Plan });

        let err: ExecutionError = RunnerError::Spawn {
            step: RunnerStep::Init,
            binary: "/nope/terraform".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        }
        .into();
        assert!(matches!(err, ExecutionError::Runner { step: RunnerStep::Init, .. }));
        assert!(err.to_string().contains("/nope/terraform"));
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::DependencyFailed {
            dependency: "net".to_string(),
        };
        assert_eq!(reason.to_string(), "dependency 'net' failed");
        assert_eq!(SkipReason::Cancelled.to_string(), "cancelled");
    }
}
