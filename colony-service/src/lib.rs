// Colony Service Library
// Plans and applies colonies of interdependent terraform modules

pub mod colony;
pub mod config;
pub mod error;
pub mod execution;
pub mod hooks;
pub mod runners;
pub mod session;
pub mod utils;
pub mod versions;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use colony::{Colony, ColonyBuilder};
pub use error::{ServiceError, ServiceResult};

// Re-export config types
pub use config::{
    command_line_flags, ColonyConfig, ConfigError, ConfigParser, ConfigValidator, ModuleConfig,
    VariableConfig, VariableFlag,
};

// Re-export execution types
pub use execution::{
    BindError, BoundExecution, EngineConfig, Execution, ExecutionEngine, ExecutionError,
    ExecutionGraph, ExecutionResult, ExecutionSet, ExecutionStatus, ExecutionStreams, GraphError,
    GraphSnapshot, Operation, ProgressLine, SkipReason, UserVariables,
};

// Re-export runner types
pub use runners::{RunnerStep, TerraformCli, TerraformCliConfig, TerraformCliFactory};

// Re-export session and version types
pub use session::{LockOwner, Session, SessionError, SessionLock, SessionRepo};
pub use versions::{Platform, VersionCache, VersionError, VersionResolver};
