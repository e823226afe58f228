// Execution Module
// Binding, dependency graph and concurrent orchestration of module runs

pub mod binder;
pub mod events;
pub mod executor;
pub mod graph;
pub mod module;
pub mod result;
pub mod variables;

// Re-export key types
pub use binder::{BindError, BoundExecution, Execution, ExecutionSet};
pub use events::{ProgressLine, ProgressReceiver, ProgressSender, ProgressSink, ResultReceiver};
pub use executor::{EngineConfig, ExecutionEngine, ExecutionStreams};
pub use graph::{DependencyNode, ExecutionGraph, GraphError, GraphSnapshot, NodeSnapshot};
pub use module::Module;
pub use result::{ExecutionError, ExecutionResult, ExecutionStatus, Operation, SkipReason};
pub use variables::UserVariables;
