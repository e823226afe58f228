// Configuration Module
// Colony configuration model, YAML loading, validation and CLI flag derivation

pub mod flags;
pub mod models;
pub mod parser;
pub mod validator;

// Re-export key types
pub use flags::{command_line_flags, VariableFlag};
pub use models::{ColonyConfig, Hooks, ModuleConfig, VariableConfig};
pub use parser::ConfigParser;
pub use validator::ConfigValidator;

use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    /// Individual problems, if this is a validation error
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid(problems) => problems,
            _ => &[],
        }
    }
}
