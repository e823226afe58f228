// Terraform Runner
// Executes terraform subcommands in a module working directory

use super::{RunOutcome, RunTarget, RunnerError, RunnerFactory, RunnerStep, TerraformRunner};
use crate::execution::events::ProgressSink;

use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Configuration for the terraform CLI runner
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCliConfig {
    /// Kill a running step when the cancellation token fires
    pub terminate_on_cancel: bool,
}

/// Runs the terraform binary as a subprocess
pub struct TerraformCli {
    target: RunTarget,
    config: TerraformCliConfig,
}

impl TerraformCli {
    pub fn new(target: RunTarget, config: TerraformCliConfig) -> Self {
        Self { target, config }
    }

    pub fn target(&self) -> &RunTarget {
        &self.target
    }

    /// Arguments for `terraform init`
    ///
    /// A working directory without configuration files is seeded from the
    /// module source.
    pub fn init_args(&self) -> Vec<String> {
        let mut args = vec!["init".to_string(), "-input=false".to_string()];
        if !has_configuration(&self.target.working_dir) {
            args.push(format!("-from-module={}", self.target.source.display()));
        }
        args
    }

    pub fn init_local_args(&self) -> Vec<String> {
        ["remote", "config", "-disable"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    pub fn plan_args(&self) -> Vec<String> {
        let mut args = vec![
            "plan".to_string(),
            "-input=false".to_string(),
            "-detailed-exitcode".to_string(),
        ];
        args.extend(self.var_args());
        args
    }

    pub fn apply_args(&self) -> Vec<String> {
        let mut args = vec![
            "apply".to_string(),
            "-input=false".to_string(),
            "-auto-approve".to_string(),
        ];
        args.extend(self.var_args());
        args
    }

    fn var_args(&self) -> Vec<String> {
        self.target
            .variables
            .iter()
            .flat_map(|(name, value)| ["-var".to_string(), format!("{name}={value}")])
            .collect()
    }

    /// Run one step, streaming output lines into the sink
    ///
    /// Returns the exit code when it is one of `accepted`.
    async fn run(
        &self,
        step: RunnerStep,
        args: Vec<String>,
        accepted: &[i32],
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<i32, RunnerError> {
        tracing::debug!(
            module = %self.target.module,
            %step,
            binary = %self.target.binary.display(),
            ?args,
            "running terraform"
        );

        let mut cmd = Command::new(&self.target.binary);
        cmd.args(&args);
        cmd.current_dir(&self.target.working_dir);
        cmd.envs(&self.target.environment);
        cmd.env("TF_IN_AUTOMATION", "1");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            step,
            binary: self.target.binary.clone(),
            source,
        })?;

        let stdout_handle = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_lines(out, sink.clone(), false)));
        let stderr_handle = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_lines(err, sink.clone(), true)));

        let waited = if self.config.terminate_on_cancel {
            tokio::select! {
                status = child.wait() => Some(status),
                _ = cancel.cancelled() => None,
            }
        } else {
            Some(child.wait().await)
        };

        let status = match waited {
            Some(status) => status,
            None => {
                tracing::info!(module = %self.target.module, %step, "terminating terraform");
                let _ = child.kill().await;
                drain(stdout_handle, stderr_handle).await;
                return Err(RunnerError::Interrupted { step });
            }
        };

        // Readers finish once the pipes close
        drain(stdout_handle, stderr_handle).await;

        let status = status.map_err(|source| RunnerError::Io { step, source })?;
        match status.code() {
            Some(code) if accepted.contains(&code) => Ok(code),
            exit_code => Err(RunnerError::Failed { step, exit_code }),
        }
    }
}

#[async_trait::async_trait]
impl TerraformRunner for TerraformCli {
    fn is_initialized(&self) -> bool {
        self.target.working_dir.join(".terraform").is_dir()
    }

    async fn init(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        tokio::fs::create_dir_all(&self.target.working_dir)
            .await
            .map_err(|source| RunnerError::Io {
                step: RunnerStep::Init,
                source,
            })?;
        let exit_code = self
            .run(RunnerStep::Init, self.init_args(), &[0], sink, cancel)
            .await?;
        Ok(RunOutcome {
            exit_code,
            changes: false,
        })
    }

    async fn init_local(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        if !self.is_initialized() {
            self.init(sink, cancel).await?;
        }
        let exit_code = self
            .run(
                RunnerStep::InitLocal,
                self.init_local_args(),
                &[0],
                sink,
                cancel,
            )
            .await?;
        Ok(RunOutcome {
            exit_code,
            changes: false,
        })
    }

    async fn plan(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        // -detailed-exitcode: 0 no changes, 2 pending changes
        let exit_code = self
            .run(RunnerStep::Plan, self.plan_args(), &[0, 2], sink, cancel)
            .await?;
        Ok(RunOutcome {
            exit_code,
            changes: exit_code == 2,
        })
    }

    async fn apply(
        &self,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, RunnerError> {
        let exit_code = self
            .run(RunnerStep::Apply, self.apply_args(), &[0], sink, cancel)
            .await?;
        Ok(RunOutcome {
            exit_code,
            changes: false,
        })
    }
}

/// Factory producing [`TerraformCli`] runners
#[derive(Debug, Clone, Copy, Default)]
pub struct TerraformCliFactory {
    config: TerraformCliConfig,
}

impl TerraformCliFactory {
    pub fn new(config: TerraformCliConfig) -> Self {
        Self { config }
    }
}

impl RunnerFactory for TerraformCliFactory {
    fn create(&self, target: RunTarget) -> Box<dyn TerraformRunner> {
        Box::new(TerraformCli::new(target, self.config))
    }
}

fn has_configuration(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .any(|entry| entry.path().extension().is_some_and(|ext| ext == "tf"))
        })
        .unwrap_or(false)
}

async fn forward_lines<R>(reader: R, sink: ProgressSink, is_error: bool)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if is_error {
            sink.error_line(line);
        } else {
            sink.line(line);
        }
    }
}

async fn drain(
    stdout: Option<tokio::task::JoinHandle<()>>,
    stderr: Option<tokio::task::JoinHandle<()>>,
) {
    for handle in [stdout, stderr].into_iter().flatten() {
        let _ = handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::events::progress_channel;

    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn target(working_dir: PathBuf, binary: PathBuf) -> RunTarget {
        let mut variables = BTreeMap::new();
        variables.insert("region".to_string(), "us-east-1".to_string());
        variables.insert("env".to_string(), "prod".to_string());
        RunTarget {
            module: "net".to_string(),
            source: PathBuf::from("/src/net"),
            working_dir,
            binary,
            variables,
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn test_init_args_seed_from_source_when_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new(
            target(dir.path().to_path_buf(), "terraform".into()),
            TerraformCliConfig::default(),
        );

        assert_eq!(
            cli.init_args(),
            vec!["init", "-input=false", "-from-module=/src/net"]
        );

        std::fs::write(dir.path().join("main.tf"), "").unwrap();
        assert_eq!(cli.init_args(), vec!["init", "-input=false"]);
    }

    #[test]
    fn test_plan_and_apply_args_pass_variables_in_name_order() {
        let cli = TerraformCli::new(
            target(PathBuf::from("/work/net"), "terraform".into()),
            TerraformCliConfig::default(),
        );

        assert_eq!(
            cli.plan_args(),
            vec![
                "plan",
                "-input=false",
                "-detailed-exitcode",
                "-var",
                "env=prod",
                "-var",
                "region=us-east-1"
            ]
        );
        assert_eq!(&cli.apply_args()[..3], &["apply", "-input=false", "-auto-approve"]);
        assert_eq!(cli.init_local_args(), vec!["remote", "config", "-disable"]);
    }

    #[test]
    fn test_is_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new(
            target(dir.path().to_path_buf(), "terraform".into()),
            TerraformCliConfig::default(),
        );
        assert!(!cli.is_initialized());

        std::fs::create_dir(dir.path().join(".terraform")).unwrap();
        assert!(cli.is_initialized());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let cli = TerraformCli::new(
            target(dir.path().to_path_buf(), dir.path().join("no-such-terraform")),
            TerraformCliConfig::default(),
        );

        let err = cli
            .plan(&ProgressSink::discard("net"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Spawn {
                step: RunnerStep::Plan,
                ..
            }
        ));
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("terraform");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn test_plan_streams_output_and_reports_changes() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = write_script(
                bin_dir.path(),
                "echo \"args: $*\"\necho \"auto: $TF_IN_AUTOMATION\"\necho oops >&2\nexit 2",
            );
            let cli = TerraformCli::new(
                target(work_dir.path().to_path_buf(), binary),
                TerraformCliConfig::default(),
            );

            let (tx, mut rx) = progress_channel();
            let sink = ProgressSink::new("net", tx);
            let outcome = cli.plan(&sink, &CancellationToken::new()).await.unwrap();
            drop(sink);

            assert!(outcome.changes);
            assert_eq!(outcome.exit_code, 2);

            let mut lines = Vec::new();
            while let Some(line) = rx.recv().await {
                lines.push(line);
            }
            assert!(lines.iter().any(|l| !l.is_error
                && l.line == "args: plan -input=false -detailed-exitcode -var env=prod -var region=us-east-1"));
            assert!(lines.iter().any(|l| l.line == "auto: 1"));
            assert!(lines.iter().any(|l| l.is_error && l.line == "oops"));
            assert!(lines.iter().all(|l| l.module == "net"));
        }

        #[tokio::test]
        async fn test_subprocess_sees_target_environment() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = write_script(bin_dir.path(), "echo \"profile: $COLONY_TEST_PROFILE\"");
            let mut target = target(work_dir.path().to_path_buf(), binary);
            target
                .environment
                .insert("COLONY_TEST_PROFILE".to_string(), "dev".to_string());
            let cli = TerraformCli::new(target, TerraformCliConfig::default());

            let (tx, mut rx) = progress_channel();
            let sink = ProgressSink::new("net", tx);
            cli.apply(&sink, &CancellationToken::new()).await.unwrap();
            drop(sink);

            assert_eq!(rx.recv().await.unwrap().line, "profile: dev");
            assert!(std::env::var("COLONY_TEST_PROFILE").is_err());
        }

        #[tokio::test]
        async fn test_apply_failure_reports_exit_code() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = write_script(bin_dir.path(), "exit 1");
            let cli = TerraformCli::new(
                target(work_dir.path().to_path_buf(), binary),
                TerraformCliConfig::default(),
            );

            let err = cli
                .apply(&ProgressSink::discard("net"), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                RunnerError::Failed {
                    step: RunnerStep::Apply,
                    exit_code: Some(1)
                }
            ));
        }

        #[tokio::test]
        async fn test_plan_exit_code_two_is_not_accepted_for_apply() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = write_script(bin_dir.path(), "exit 2");
            let cli = TerraformCli::new(
                target(work_dir.path().to_path_buf(), binary),
                TerraformCliConfig::default(),
            );

            let err = cli
                .apply(&ProgressSink::discard("net"), &CancellationToken::new())
                .await
                .unwrap_err();
            assert!(matches!(err, RunnerError::Failed { exit_code: Some(2), .. }));
        }

        #[tokio::test]
        async fn test_init_local_initializes_first() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let log = bin_dir.path().join("calls.log");
            let binary = write_script(
                bin_dir.path(),
                &format!(
                    "echo \"$1\" >> {}\nif [ \"$1\" = init ]; then mkdir -p .terraform; fi",
                    log.display()
                ),
            );
            let cli = TerraformCli::new(
                target(work_dir.path().join("modules/net"), binary),
                TerraformCliConfig::default(),
            );

            cli.init_local(&ProgressSink::discard("net"), &CancellationToken::new())
                .await
                .unwrap();

            assert!(cli.is_initialized());
            let calls = std::fs::read_to_string(&log).unwrap();
            assert_eq!(calls.lines().collect::<Vec<_>>(), vec!["init", "remote"]);
        }

        #[tokio::test]
        async fn test_cancel_terminates_when_configured() {
            let bin_dir = tempfile::tempdir().unwrap();
            let work_dir = tempfile::tempdir().unwrap();
            let binary = write_script(bin_dir.path(), "exec sleep 30");
            let cli = TerraformCli::new(
                target(work_dir.path().to_path_buf(), binary),
                TerraformCliConfig {
                    terminate_on_cancel: true,
                },
            );

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                trigger.cancel();
            });

            let err = tokio::time::timeout(
                Duration::from_secs(10),
                cli.apply(&ProgressSink::discard("net"), &cancel),
            )
            .await
            .unwrap()
            .unwrap_err();
            assert!(matches!(
                err,
                RunnerError::Interrupted {
                    step: RunnerStep::Apply
                }
            ));
        }
    }
}
