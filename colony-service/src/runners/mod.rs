// Runners Module
// Narrow interface to the external terraform binary

pub mod terraform;

// Re-export key types
pub use terraform::{TerraformCli, TerraformCliConfig, TerraformCliFactory};

use crate::execution::events::ProgressSink;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// One terraform invocation step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerStep {
    Init,
    InitLocal,
    Plan,
    Apply,
}

impl fmt::Display for RunnerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunnerStep::Init => "init",
            RunnerStep::InitLocal => "init-local",
            RunnerStep::Plan => "plan",
            RunnerStep::Apply => "apply",
        };
        f.write_str(name)
    }
}

/// Errors reported by a runner step
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to start {}: {source}", .binary.display())]
    Spawn {
        step: RunnerStep,
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("terraform {step} exited with code {exit_code:?}")]
    Failed {
        step: RunnerStep,
        exit_code: Option<i32>,
    },

    #[error("terraform {step} was interrupted")]
    Interrupted { step: RunnerStep },

    #[error("terraform {step} I/O error: {source}")]
    Io {
        step: RunnerStep,
        #[source]
        source: std::io::Error,
    },
}

/// Successful outcome of a runner step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// A plan found pending changes
    pub changes: bool,
}

/// Everything a runner is bound to for one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTarget {
    pub module: String,
    /// Module source code location
    pub source: PathBuf,
    /// Module working directory inside the session
    pub working_dir: PathBuf,
    /// Resolved terraform binary
    pub binary: PathBuf,
    pub variables: BTreeMap<String, String>,
    /// Extra environment for the subprocess, on top of this process's own
    pub environment: BTreeMap<String, String>,
}

/// Terraform operations for one module working directory
///
/// Progress goes to the sink line by line. Implementations decide how to
/// honour the cancellation token for a step that has already started.
#[async_trait::async_trait]
pub trait TerraformRunner: Send + Sync {
    /// Working directory already initialized
    fn is_initialized(&self) -> bool;

    async fn init(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError>;

    /// Mirror remote state locally so later steps run detached from the backend
    async fn init_local(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError>;

    async fn plan(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError>;

    async fn apply(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError>;
}

/// Creates runners bound to a target
pub trait RunnerFactory: Send + Sync {
    fn create(&self, target: RunTarget) -> Box<dyn TerraformRunner>;
}
