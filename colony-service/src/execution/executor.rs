// Execution Engine
// Runs bound executions concurrently, batch by batch for apply

use crate::execution::binder::BoundExecution;
use crate::execution::events::{
    progress_channel, result_channel, EventSender, ProgressLine, ProgressReceiver, ProgressSender,
    ProgressSink, ResultReceiver, ResultSender,
};
use crate::execution::graph::ExecutionGraph;
use crate::execution::result::{
    ExecutionError, ExecutionResult, ExecutionStatus, Operation, SkipReason,
};
use crate::runners::{RunTarget, RunnerError, RunnerFactory, TerraformRunner};
use crate::session::{Session, SessionError, SessionLock};
use crate::versions::VersionResolver;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Configuration for the execution engine
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Maximum concurrently running executions (0 = unlimited)
    pub max_parallel: usize,
    /// Environment passed to every terraform subprocess
    pub environment: BTreeMap<String, String>,
}

/// Live output of one plan or apply call
///
/// Both streams close once every execution has reported.
pub struct ExecutionStreams {
    pub progress: ProgressReceiver,
    pub results: ResultReceiver,
    handle: JoinHandle<()>,
}

impl ExecutionStreams {
    pub fn into_parts(self) -> (ProgressReceiver, ResultReceiver, JoinHandle<()>) {
        (self.progress, self.results, self.handle)
    }

    /// Wait for completion and gather both streams
    pub async fn collect(self) -> (Vec<ProgressLine>, Vec<ExecutionResult>) {
        let (mut progress, mut results, handle) = self.into_parts();

        let mut collected = Vec::new();
        while let Some(result) = results.recv().await {
            collected.push(result);
        }
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "execution driver failed");
        }

        let mut lines = Vec::new();
        while let Some(line) = progress.recv().await {
            lines.push(line);
        }
        (lines, collected)
    }
}

struct Shared {
    session: Session,
    versions: Arc<VersionResolver>,
    runners: Arc<dyn RunnerFactory>,
    limit: Option<Arc<Semaphore>>,
    environment: BTreeMap<String, String>,
}

/// Drives executions against one session
#[derive(Clone)]
pub struct ExecutionEngine {
    shared: Arc<Shared>,
}

impl ExecutionEngine {
    pub fn new(
        session: Session,
        versions: Arc<VersionResolver>,
        runners: Arc<dyn RunnerFactory>,
        config: EngineConfig,
    ) -> Self {
        let limit = (config.max_parallel > 0).then(|| Arc::new(Semaphore::new(config.max_parallel)));
        Self {
            shared: Arc::new(Shared {
                session,
                versions,
                runners,
                limit,
                environment: config.environment,
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    /// Plan every execution at once, ignoring dependencies
    ///
    /// With `detach` each module first mirrors its remote state into the
    /// session so the plan never touches the backend.
    pub fn plan_all(
        &self,
        executions: Vec<BoundExecution>,
        detach: bool,
        cancel: CancellationToken,
    ) -> ExecutionStreams {
        tracing::info!(count = executions.len(), detach, "planning executions");
        let shared = self.shared.clone();
        spawn_driver(None, move |progress, results| async move {
            run_concurrently(
                &shared,
                executions,
                Operation::Plan,
                detach,
                &progress,
                &results,
                &cancel,
            )
            .await;
        })
    }

    /// Apply a whole graph batch by batch
    ///
    /// A failure skips everything downstream of it; unrelated executions
    /// keep running.
    pub fn apply_graph(
        &self,
        graph: ExecutionGraph<BoundExecution>,
        cancel: CancellationToken,
    ) -> Result<ExecutionStreams, SessionError> {
        let lock = self.shared.session.lock()?;
        tracing::info!(
            count = graph.len(),
            batches = graph.batches().len(),
            session = %self.shared.session.id(),
            "applying graph"
        );
        let shared = self.shared.clone();
        Ok(spawn_driver(Some(lock), move |progress, results| async move {
            apply_batches(&shared, graph, &progress, &results, &cancel).await;
        }))
    }

    /// Apply an explicit subset concurrently, without dependency ordering
    ///
    /// The caller is responsible for sequencing the named modules.
    pub fn apply_subset(
        &self,
        executions: Vec<BoundExecution>,
        cancel: CancellationToken,
    ) -> Result<ExecutionStreams, SessionError> {
        let lock = self.shared.session.lock()?;
        tracing::info!(
            count = executions.len(),
            session = %self.shared.session.id(),
            "applying subset without dependency ordering"
        );
        let shared = self.shared.clone();
        Ok(spawn_driver(Some(lock), move |progress, results| async move {
            run_concurrently(
                &shared,
                executions,
                Operation::Apply,
                false,
                &progress,
                &results,
                &cancel,
            )
            .await;
        }))
    }
}

fn spawn_driver<F, Fut>(lock: Option<SessionLock>, drive: F) -> ExecutionStreams
where
    F: FnOnce(ProgressSender, ResultSender) -> Fut,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (progress_tx, progress) = progress_channel();
    let (results_tx, results) = result_channel();
    let work = drive(progress_tx, results_tx);
    let handle = tokio::spawn(async move {
        work.await;
        // Released only after every execution reported
        drop(lock);
    });
    ExecutionStreams {
        progress,
        results,
        handle,
    }
}

async fn apply_batches(
    shared: &Arc<Shared>,
    graph: ExecutionGraph<BoundExecution>,
    progress: &ProgressSender,
    results: &ResultSender,
    cancel: &CancellationToken,
) {
    // Index of every execution that did not succeed
    let mut unsuccessful: HashSet<usize> = HashSet::new();

    for (level, batch) in graph.batches().iter().enumerate() {
        let mut runnable = Vec::new();
        for &index in batch {
            let execution = graph.node(index);
            let failed_dependency = graph
                .dependencies(index)
                .iter()
                .find(|dep| unsuccessful.contains(*dep));

            let reason = match failed_dependency {
                Some(&dep) => Some(SkipReason::DependencyFailed {
                    dependency: graph.node(dep).name().to_string(),
                }),
                None if cancel.is_cancelled() => Some(SkipReason::Cancelled),
                None => None,
            };

            match reason {
                Some(reason) => {
                    unsuccessful.insert(index);
                    report_skip(execution, Operation::Apply, reason, results);
                }
                None => runnable.push(index),
            }
        }

        if runnable.is_empty() {
            continue;
        }

        tracing::debug!(batch = level, size = runnable.len(), "starting batch");
        let executions = runnable.iter().map(|&i| graph.node(i).clone()).collect();
        let outcomes = run_concurrently(
            shared,
            executions,
            Operation::Apply,
            false,
            progress,
            results,
            cancel,
        )
        .await;

        for (index, result) in runnable.into_iter().zip(outcomes) {
            if !result.is_success() {
                unsuccessful.insert(index);
            }
        }
    }
}

/// Run executions as one concurrent set
///
/// Results are sent as each finishes and returned in input order.
async fn run_concurrently(
    shared: &Arc<Shared>,
    executions: Vec<BoundExecution>,
    operation: Operation,
    detach: bool,
    progress: &ProgressSender,
    results: &ResultSender,
    cancel: &CancellationToken,
) -> Vec<ExecutionResult> {
    let mut set = JoinSet::new();
    for (index, execution) in executions.iter().enumerate() {
        let shared = shared.clone();
        let execution = execution.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        set.spawn(async move {
            let result = run_one(&shared, &execution, operation, detach, progress, &cancel).await;
            (index, result)
        });
    }

    let mut finished: Vec<Option<ExecutionResult>> = executions.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => {
                results.send_event(result.clone());
                finished[index] = Some(result);
            }
            Err(e) => tracing::error!(error = %e, "execution task did not complete"),
        }
    }

    finished
        .into_iter()
        .zip(&executions)
        .map(|(result, execution)| {
            result.unwrap_or_else(|| {
                let result = ExecutionResult::failed(
                    execution,
                    operation,
                    ExecutionError::Aborted("execution task panicked".to_string()),
                    Duration::ZERO,
                );
                results.send_event(result.clone());
                result
            })
        })
        .collect()
}

async fn run_one(
    shared: &Shared,
    execution: &BoundExecution,
    operation: Operation,
    detach: bool,
    progress: ProgressSender,
    cancel: &CancellationToken,
) -> ExecutionResult {
    let module = execution.name();

    let _permit = match &shared.limit {
        Some(limit) => {
            let acquired = tokio::select! {
                permit = limit.clone().acquire_owned() => permit.ok(),
                _ = cancel.cancelled() => None,
            };
            match acquired {
                Some(permit) => Some(permit),
                None => return skip(execution, operation, SkipReason::Cancelled),
            }
        }
        None => None,
    };
    if cancel.is_cancelled() {
        return skip(execution, operation, SkipReason::Cancelled);
    }

    let start = Instant::now();
    tracing::info!(module, %operation, "starting execution");

    let binary = match shared.versions.resolve_for(execution.module()).await {
        Ok(binary) => binary,
        Err(e) => {
            let version = shared
                .versions
                .version_for(execution.module())
                .unwrap_or("system")
                .to_string();
            let error = ExecutionError::VersionResolutionFailed {
                version,
                reason: e.to_string(),
            };
            return finish(execution, operation, Err(error), start);
        }
    };

    let working_dir = shared.session.module_dir(module);
    if let Err(e) = tokio::fs::create_dir_all(&working_dir).await {
        let error = ExecutionError::Workspace(format!("{}: {e}", working_dir.display()));
        return finish(execution, operation, Err(error), start);
    }

    let runner = shared.runners.create(RunTarget {
        module: module.to_string(),
        source: execution.module().source().to_path_buf(),
        working_dir,
        binary,
        variables: execution.variables().clone(),
        environment: shared.environment.clone(),
    });
    let sink = ProgressSink::new(module, progress);

    let outcome = drive(
        &shared.session,
        runner.as_ref(),
        module,
        operation,
        detach,
        &sink,
        cancel,
    )
    .await
    .map_err(ExecutionError::from);
    finish(execution, operation, outcome, start)
}

/// Init when needed, then the requested operation
async fn drive(
    session: &Session,
    runner: &dyn TerraformRunner,
    module: &str,
    operation: Operation,
    detach: bool,
    sink: &ProgressSink,
    cancel: &CancellationToken,
) -> Result<Option<bool>, RunnerError> {
    if detach {
        session.init_local(module, runner, sink, cancel).await?;
    }
    if !runner.is_initialized() {
        runner.init(sink, cancel).await?;
    }
    match operation {
        Operation::Plan => Ok(Some(runner.plan(sink, cancel).await?.changes)),
        Operation::Apply => {
            runner.apply(sink, cancel).await?;
            Ok(None)
        }
    }
}

fn finish(
    execution: &BoundExecution,
    operation: Operation,
    outcome: Result<Option<bool>, ExecutionError>,
    start: Instant,
) -> ExecutionResult {
    let duration = start.elapsed();
    let result = match outcome {
        Ok(changes) => ExecutionResult::succeeded(execution, operation, duration, changes),
        Err(error) => ExecutionResult::failed(execution, operation, error, duration),
    };
    match &result.status {
        ExecutionStatus::Failed(error) => {
            tracing::warn!(module = %result.module, %operation, %error, "execution failed")
        }
        _ => tracing::info!(module = %result.module, %operation, ?duration, "execution succeeded"),
    }
    result
}

fn skip(execution: &BoundExecution, operation: Operation, reason: SkipReason) -> ExecutionResult {
    tracing::warn!(module = execution.name(), %operation, %reason, "execution skipped");
    ExecutionResult::skipped(execution, operation, reason)
}

fn report_skip(
    execution: &BoundExecution,
    operation: Operation,
    reason: SkipReason,
    results: &ResultSender,
) {
    results.send_event(skip(execution, operation, reason));
}
