// Session Repository
// Sessions on disk plus the record of which one is current

use super::{Session, SessionError};
use crate::utils::is_safe_name;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const CURRENT_FILE: &str = "CURRENT";

/// Produces new session identifiers
pub type IdGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Time-sortable identifiers
fn uuid_v7() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Directory of sessions keyed by identifier
pub struct SessionRepo {
    root: PathBuf,
    id_generator: IdGenerator,
}

impl std::fmt::Debug for SessionRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRepo").field("root", &self.root).finish()
    }
}

impl SessionRepo {
    /// Open a repository, creating its directory when missing
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(SessionError::io(&root))?;
        Ok(Self {
            root,
            id_generator: Arc::new(uuid_v7),
        })
    }

    pub fn with_id_generator(mut self, id_generator: IdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The recorded current session, or a fresh one
    pub fn current(&self) -> Result<Session, SessionError> {
        match self.current_id()? {
            Some(id) => match self.get(&id) {
                Ok(session) => {
                    tracing::debug!(session = %id, "resuming session");
                    Ok(session)
                }
                Err(SessionError::NotFound(_)) => {
                    tracing::warn!(session = %id, "current session is missing, creating a new one");
                    self.create()
                }
                Err(e) => Err(e),
            },
            None => self.create(),
        }
    }

    /// Identifier recorded as current, without creating anything
    pub fn current_id(&self) -> Result<Option<String>, SessionError> {
        let path = self.root.join(CURRENT_FILE);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let id = contents.trim();
                Ok((!id.is_empty()).then(|| id.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SessionError::Io { path, source }),
        }
    }

    /// Create a session and make it current
    pub fn create(&self) -> Result<Session, SessionError> {
        let id = (self.id_generator)();
        let dir = self.root.join(&id);
        let modules = dir.join("modules");
        fs::create_dir_all(&modules).map_err(SessionError::io(&modules))?;
        self.write_current(&id)?;
        tracing::info!(session = %id, dir = %dir.display(), "created session");
        Ok(Session::new(id, dir))
    }

    pub fn get(&self, id: &str) -> Result<Session, SessionError> {
        if !is_safe_name(id) {
            return Err(SessionError::NotFound(id.to_string()));
        }
        let dir = self.root.join(id);
        if dir.is_dir() {
            Ok(Session::new(id.to_string(), dir))
        } else {
            Err(SessionError::NotFound(id.to_string()))
        }
    }

    /// All sessions, oldest first
    pub fn list(&self) -> Result<Vec<Session>, SessionError> {
        let entries = fs::read_dir(&self.root).map_err(SessionError::io(&self.root))?;
        let mut sessions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(SessionError::io(&self.root))?;
            let Ok(id) = entry.file_name().into_string() else {
                continue;
            };
            if is_safe_name(&id) && entry.path().is_dir() {
                sessions.push(Session::new(id, entry.path()));
            }
        }
        sessions.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(sessions)
    }

    pub fn set_current(&self, id: &str) -> Result<Session, SessionError> {
        let session = self.get(id)?;
        self.write_current(id)?;
        tracing::info!(session = %id, "switched current session");
        Ok(session)
    }

    /// Remove a session and its working copy
    pub fn cleanup(&self, id: &str) -> Result<(), SessionError> {
        let session = self.get(id)?;
        if session.is_locked() {
            return Err(SessionError::Busy(id.to_string()));
        }
        fs::remove_dir_all(session.dir()).map_err(SessionError::io(session.dir()))?;

        if self.current_id()?.as_deref() == Some(id) {
            let current = self.root.join(CURRENT_FILE);
            fs::remove_file(&current).map_err(SessionError::io(&current))?;
        }
        tracing::info!(session = %id, "removed session");
        Ok(())
    }

    /// Force-release a session's lock, e.g. one left by a crashed apply
    pub fn unlock(&self, id: &str) -> Result<bool, SessionError> {
        self.get(id)?.unlock()
    }

    fn write_current(&self, id: &str) -> Result<(), SessionError> {
        let path = self.root.join(CURRENT_FILE);
        fs::write(&path, id).map_err(SessionError::io(&path))
    }
}
