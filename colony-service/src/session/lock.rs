// Session Lock
// Exclusive ownership of a session, recorded with the holder's pid and host

use super::SessionError;

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Process holding a session lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub hostname: String,
}

impl LockOwner {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            hostname: local_hostname(),
        }
    }

    /// The holder ran on this host and is gone
    ///
    /// Locks taken on another host are never considered stale.
    pub fn is_stale(&self) -> bool {
        self.hostname == local_hostname() && !process_alive(self.pid)
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(pid) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(pid), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Read the owner recorded in a lock file
///
/// `None` when there is no lock or it cannot be parsed.
pub(super) fn read_owner(path: &Path) -> Option<LockOwner> {
    let content = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&content).ok()
}

/// Create the lock file, taking over a stale one at most once
pub(super) fn acquire(path: PathBuf, session: &str) -> Result<SessionLock, SessionError> {
    for _ in 0..2 {
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let lock = SessionLock { path };
                let owner = serde_yaml::to_string(&LockOwner::current()).map_err(io::Error::other);
                owner
                    .and_then(|owner| file.write_all(owner.as_bytes()))
                    .map_err(SessionError::io(&lock.path))?;
                return Ok(lock);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => match read_owner(&path) {
                Some(owner) if owner.is_stale() => {
                    tracing::warn!(
                        session,
                        pid = owner.pid,
                        "taking over lock left by a process that is no longer running"
                    );
                    remove(&path)?;
                }
                _ => return Err(SessionError::Busy(session.to_string())),
            },
            Err(source) => return Err(SessionError::Io { path, source }),
        }
    }
    Err(SessionError::Busy(session.to_string()))
}

/// Delete a lock file; returns false when there was none
pub(super) fn remove(path: &Path) -> Result<bool, SessionError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(SessionError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Exclusive hold on a session, released on drop
#[derive(Debug)]
pub struct SessionLock {
    path: PathBuf,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release session lock");
        }
    }
}
