// Session Module
// Isolated working copies of remote state

pub mod lock;
pub mod repo;

// Re-export key types
pub use lock::{LockOwner, SessionLock};
pub use repo::{IdGenerator, SessionRepo};

use crate::execution::events::ProgressSink;
use crate::runners::{RunnerError, RunnerStep, TerraformRunner};

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Marker left in a module directory once it runs against local state
pub const LOCAL_MARKER: &str = ".colony-local";

const LOCK_FILE: &str = ".lock";

/// Errors that can occur with sessions
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("session not found: {0}")]
    NotFound(String),

    #[error("session {0} is locked by another apply; run `colony session unlock` if that apply is no longer running")]
    Busy(String),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| SessionError::Io { path, source }
    }
}

/// One working copy of remote state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    dir: PathBuf,
}

impl Session {
    pub(crate) fn new(id: String, dir: PathBuf) -> Self {
        Self { id, dir }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Working directory for one module
    pub fn module_dir(&self, module: &str) -> PathBuf {
        self.dir.join("modules").join(module)
    }

    /// Module already mirrors its remote state locally
    pub fn is_local(&self, module: &str) -> bool {
        self.module_dir(module).join(LOCAL_MARKER).is_file()
    }

    /// Mirror a module's remote state into this session
    ///
    /// Returns false when the module was already local.
    pub async fn init_local(
        &self,
        module: &str,
        runner: &dyn TerraformRunner,
        sink: &ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<bool, RunnerError> {
        if self.is_local(module) {
            return Ok(false);
        }

        runner.init_local(sink, cancel).await?;

        let marker = self.module_dir(module).join(LOCAL_MARKER);
        tokio::fs::write(&marker, self.id.as_bytes())
            .await
            .map_err(|source| RunnerError::Io {
                step: RunnerStep::InitLocal,
                source,
            })?;
        tracing::debug!(session = %self.id, module, "module initialized locally");
        Ok(true)
    }

    /// Take exclusive ownership of this session
    ///
    /// Fails with [`SessionError::Busy`] while another live process holds
    /// the lock. A lock left by a process that exited on this host is taken
    /// over.
    pub fn lock(&self) -> Result<SessionLock, SessionError> {
        lock::acquire(self.lock_path(), &self.id)
    }

    /// Held by a live process, or by one whose liveness cannot be checked
    pub fn is_locked(&self) -> bool {
        let path = self.lock_path();
        path.exists() && !lock::read_owner(&path).is_some_and(|owner| owner.is_stale())
    }

    /// Process recorded as holding the lock
    pub fn lock_owner(&self) -> Option<LockOwner> {
        lock::read_owner(&self.lock_path())
    }

    /// Remove the lock whoever holds it; returns false when unlocked
    pub fn unlock(&self) -> Result<bool, SessionError> {
        let removed = lock::remove(&self.lock_path())?;
        if removed {
            tracing::warn!(session = %self.id, "session lock removed by force");
        }
        Ok(removed)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }
}
