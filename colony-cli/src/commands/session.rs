use crate::output;

use clap::{Args, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use colony_service::{Colony, SessionRepo};

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommands,
}

#[derive(Subcommand)]
pub enum SessionCommands {
    /// Show the current session
    Show,
    /// Start a new session and make it current
    New,
    /// List every session, oldest first
    List,
    /// Make an existing session current
    Use {
        /// Session id
        id: String,
    },
    /// Release a lock left behind by an apply that did not exit cleanly
    Unlock {
        /// Session id (default: the current session)
        id: Option<String>,
    },
    /// Remove a session and its working directories
    Clean {
        /// Session id (default: the current session)
        id: Option<String>,
    },
}

pub fn execute(colony: &Colony, args: &SessionArgs) -> Result<i32> {
    let sessions = colony.sessions();

    match &args.command {
        SessionCommands::Show => match sessions.current_id()? {
            Some(id) => {
                let session = sessions.get(&id)?;
                println!("{}", session.id());
                output::dim(&format!("  {}", session.dir().display()));
                if session.is_locked() {
                    match session.lock_owner() {
                        Some(owner) => output::warning(&format!(
                            "locked by pid {} on {}",
                            owner.pid, owner.hostname
                        )),
                        None => output::warning("locked"),
                    }
                }
            }
            None => output::dim("no current session"),
        },
        SessionCommands::New => {
            let session = sessions.create()?;
            output::success(&format!("created session {}", session.id()));
            println!("{}", session.id());
        }
        SessionCommands::List => {
            let current = sessions.current_id()?;
            for session in sessions.list()? {
                let marker = if current.as_deref() == Some(session.id()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}", session.id());
            }
        }
        SessionCommands::Use { id } => {
            let session = sessions.set_current(id)?;
            output::success(&format!("switched to session {}", session.id()));
        }
        SessionCommands::Unlock { id } => {
            let id = target_id(sessions, id, "unlock")?;
            if sessions.unlock(&id)? {
                output::success(&format!("unlocked session {id}"));
            } else {
                output::dim(&format!("session {id} was not locked"));
            }
        }
        SessionCommands::Clean { id } => {
            let id = target_id(sessions, id, "clean")?;
            sessions.cleanup(&id)?;
            output::success(&format!("removed session {id}"));
        }
    }
    Ok(0)
}

/// Explicit id, or the current session
fn target_id(sessions: &SessionRepo, id: &Option<String>, action: &str) -> Result<String> {
    match id {
        Some(id) => Ok(id.clone()),
        None => sessions
            .current_id()?
            .ok_or_else(|| eyre!("no current session to {action}")),
    }
}
