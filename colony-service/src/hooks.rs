// Startup Hooks
// Shell commands run before a colony is used

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

const ENV_MARKER: &str = "__COLONY_HOOK_ENV__";

/// Variables the shell sets on its own
const SHELL_OWNED: &[&str] = &["_", "SHLVL", "PWD", "OLDPWD"];

/// Errors that can occur running a hook
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to start hook '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hook '{command}' failed with status {status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
}

/// Variables exported by startup hooks
pub type HookEnvironment = BTreeMap<String, String>;

/// Runs one hook command in a directory
#[async_trait::async_trait]
pub trait HookRunner: Send + Sync {
    /// Run `command` with `env` layered over this process's environment
    ///
    /// Returns the variables the command set or changed.
    async fn run(
        &self,
        command: &str,
        dir: &Path,
        env: &HookEnvironment,
    ) -> Result<HookEnvironment, HookError>;
}

/// Runs hooks with `sh -c`
///
/// The environment left behind by the command is read back with `env -0`,
/// so values spanning several lines survive intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellHookRunner;

impl ShellHookRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl HookRunner for ShellHookRunner {
    async fn run(
        &self,
        command: &str,
        dir: &Path,
        env: &HookEnvironment,
    ) -> Result<HookEnvironment, HookError> {
        tracing::info!(command, dir = %dir.display(), "running startup hook");

        let script = format!(
            "{command}\n__colony_rc=$?\n[ $__colony_rc -eq 0 ] || exit $__colony_rc\nprintf '%s\\0' {ENV_MARKER}\nenv -0"
        );
        let output = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .current_dir(dir)
            .envs(env)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| HookError::Spawn {
                command: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(HookError::Failed {
                command: command.to_string(),
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let mut baseline: HashMap<String, String> = std::env::vars().collect();
        baseline.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let stdout = String::from_utf8_lossy(&output.stdout);
        let changed = changed_variables(&stdout, &baseline);
        for name in changed.keys() {
            tracing::debug!(variable = %name, "hook exported variable");
        }
        Ok(changed)
    }
}

/// Variables in a NUL-separated environment dump that differ from `baseline`
fn changed_variables(stdout: &str, baseline: &HashMap<String, String>) -> HookEnvironment {
    let Some((_, dump)) = stdout.split_once(&format!("{ENV_MARKER}\0")) else {
        return HookEnvironment::new();
    };

    dump.split('\0')
        .filter_map(|entry| entry.split_once('='))
        .filter(|(name, _)| is_env_name(name) && !SHELL_OWNED.contains(name))
        .filter(|(name, value)| baseline.get(*name).map(String::as_str) != Some(*value))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
