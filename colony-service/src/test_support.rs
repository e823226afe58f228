// Test Support
// Test doubles for the external collaborators

use crate::execution::events::ProgressSink;
use crate::hooks::{HookEnvironment, HookError, HookRunner};
use crate::runners::{RunOutcome, RunTarget, RunnerError, RunnerFactory, RunnerStep, TerraformRunner};
use crate::versions::{Installer, Platform, VersionError};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RunnerState {
    failures: Mutex<HashMap<String, RunnerStep>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<(String, RunnerStep)>>,
    targets: Mutex<Vec<RunTarget>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

/// Scripted runners that record every step
#[derive(Clone, Default)]
pub struct FakeRunnerFactory {
    state: Arc<RunnerState>,
}

impl FakeRunnerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail `module` at `step` with exit code 1
    pub fn fail(self, module: &str, step: RunnerStep) -> Self {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert(module.to_string(), step);
        self
    }

    /// Every step of `module` takes `ms` milliseconds
    pub fn delay(self, module: &str, ms: u64) -> Self {
        self.state
            .delays
            .lock()
            .unwrap()
            .insert(module.to_string(), Duration::from_millis(ms));
        self
    }

    pub fn calls(&self) -> Vec<(String, RunnerStep)> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, module: &str) -> Vec<RunnerStep> {
        self.calls()
            .into_iter()
            .filter(|(m, _)| m == module)
            .map(|(_, step)| step)
            .collect()
    }

    /// Modules that ran `step`, in call order
    pub fn modules_with(&self, step: RunnerStep) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(_, s)| *s == step)
            .map(|(m, _)| m)
            .collect()
    }

    pub fn targets(&self) -> Vec<RunTarget> {
        self.state.targets.lock().unwrap().clone()
    }

    pub fn max_running(&self) -> usize {
        self.state.max_running.load(Ordering::SeqCst)
    }
}

impl RunnerFactory for FakeRunnerFactory {
    fn create(&self, target: RunTarget) -> Box<dyn TerraformRunner> {
        self.state.targets.lock().unwrap().push(target.clone());
        Box::new(FakeRunner {
            target,
            state: self.state.clone(),
        })
    }
}

struct FakeRunner {
    target: RunTarget,
    state: Arc<RunnerState>,
}

impl FakeRunner {
    async fn step(&self, step: RunnerStep, sink: &ProgressSink) -> Result<RunOutcome, RunnerError> {
        let module = self.target.module.clone();
        self.state.calls.lock().unwrap().push((module.clone(), step));

        let running = self.state.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_running.fetch_max(running, Ordering::SeqCst);

        sink.line(format!("{step} {module}"));
        let delay = self.state.delays.lock().unwrap().get(&module).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state.running.fetch_sub(1, Ordering::SeqCst);

        let failing = self.state.failures.lock().unwrap().get(&module).copied();
        if failing == Some(step) {
            sink.error_line(format!("{step} failed"));
            return Err(RunnerError::Failed {
                step,
                exit_code: Some(1),
            });
        }

        if matches!(step, RunnerStep::Init | RunnerStep::InitLocal) {
            std::fs::create_dir_all(self.target.working_dir.join(".terraform")).map_err(
                |source| RunnerError::Io { step, source },
            )?;
        }
        Ok(RunOutcome {
            exit_code: 0,
            changes: step == RunnerStep::Plan,
        })
    }
}

#[async_trait::async_trait]
impl TerraformRunner for FakeRunner {
    fn is_initialized(&self) -> bool {
        self.target.working_dir.join(".terraform").is_dir()
    }

    async fn init(&self, sink: &ProgressSink, _: &CancellationToken) -> Result<RunOutcome, RunnerError> {
        self.step(RunnerStep::Init, sink).await
    }

    async fn init_local(
        &self,
        sink: &ProgressSink,
        _: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        self.step(RunnerStep::InitLocal, sink).await
    }

    async fn plan(&self, sink: &ProgressSink, _: &CancellationToken) -> Result<RunOutcome, RunnerError> {
        self.step(RunnerStep::Plan, sink).await
    }

    async fn apply(&self, sink: &ProgressSink, _: &CancellationToken) -> Result<RunOutcome, RunnerError> {
        self.step(RunnerStep::Apply, sink).await
    }
}

/// Installer writing a placeholder binary
#[derive(Default)]
pub struct FakeInstaller {
    installs: Mutex<Vec<String>>,
    delay_ms: u64,
    fail: bool,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn installs(&self) -> Vec<String> {
        self.installs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Installer for FakeInstaller {
    async fn install(
        &self,
        version: &str,
        _platform: &Platform,
        dest: &Path,
    ) -> Result<(), VersionError> {
        self.installs.lock().unwrap().push(version.to_string());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(VersionError::Download {
                url: format!("fake://{version}"),
                reason: "offline".to_string(),
            });
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dest, "fake terraform")?;
        Ok(())
    }
}

/// Hook runner recording commands and working directories
#[derive(Default)]
pub struct FakeHookRunner {
    runs: Mutex<Vec<(String, PathBuf)>>,
    seen: Mutex<Vec<HookEnvironment>>,
    failing: Option<String>,
    exports: Vec<(String, String, String)>,
}

impl FakeHookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(command: &str) -> Self {
        Self {
            failing: Some(command.to_string()),
            ..Self::default()
        }
    }

    /// Running `command` exports `name=value`
    pub fn exporting(mut self, command: &str, name: &str, value: &str) -> Self {
        self.exports
            .push((command.to_string(), name.to_string(), value.to_string()));
        self
    }

    pub fn runs(&self) -> Vec<(String, PathBuf)> {
        self.runs.lock().unwrap().clone()
    }

    /// Environment each hook was started with, in run order
    pub fn environments(&self) -> Vec<HookEnvironment> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HookRunner for FakeHookRunner {
    async fn run(
        &self,
        command: &str,
        dir: &Path,
        env: &HookEnvironment,
    ) -> Result<HookEnvironment, HookError> {
        self.runs
            .lock()
            .unwrap()
            .push((command.to_string(), dir.to_path_buf()));
        self.seen.lock().unwrap().push(env.clone());
        if self.failing.as_deref() == Some(command) {
            return Err(HookError::Failed {
                command: command.to_string(),
                status: Some(1),
                stderr: "hook failed".to_string(),
            });
        }
        Ok(self
            .exports
            .iter()
            .filter(|(cmd, _, _)| cmd == command)
            .map(|(_, name, value)| (name.clone(), value.clone()))
            .collect())
    }
}
