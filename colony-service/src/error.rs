// Service Errors
// Construction-time failures; nothing has run when one of these is returned

use crate::config::ConfigError;
use crate::execution::{BindError, GraphError};
use crate::hooks::HookError;
use crate::session::SessionError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Bind(#[from] BindError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("startup hook failed: {0}")]
    Hook(#[from] HookError),

    #[error("unknown module: '{0}'")]
    UnknownModule(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
