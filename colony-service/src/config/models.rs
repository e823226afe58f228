// Colony Configuration Models
// Types describing a colony: its modules, their variables, and lifecycle hooks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root colony configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColonyConfig {
    /// Directory under which the `.tfcolony` session repository lives
    #[serde(default = "default_session_repo_dir")]
    pub session_repo_dir: PathBuf,

    /// Directory holding installed terraform versions (default: ~/.tfcolony/versions)
    #[serde(default)]
    pub versions_dir: Option<PathBuf>,

    /// Colony-wide terraform version
    #[serde(default)]
    pub terraform_version: Option<String>,

    /// Maximum concurrently running executions (0 = unlimited)
    #[serde(default)]
    pub max_parallel: usize,

    /// Kill running terraform processes on Ctrl-C instead of letting them finish
    #[serde(default)]
    pub terminate_on_cancel: bool,

    /// Lifecycle hooks
    #[serde(default)]
    pub hooks: Hooks,

    /// Modules, in configuration order
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

fn default_session_repo_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ColonyConfig {
    fn default() -> Self {
        Self {
            session_repo_dir: default_session_repo_dir(),
            versions_dir: None,
            terraform_version: None,
            max_parallel: 0,
            terminate_on_cancel: false,
            hooks: Hooks::default(),
            modules: Vec::new(),
        }
    }
}

impl ColonyConfig {
    /// Look up a module by name
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Names of all modules in configuration order
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Commands run at well-known points of the colony lifecycle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    /// Shell commands run, in order, when the colony is constructed
    #[serde(default)]
    pub startup: Vec<String>,
}

/// A single terraform module
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub name: String,

    /// Location of the module's terraform code
    pub source: PathBuf,

    /// Module-local terraform version override
    #[serde(default)]
    pub terraform_version: Option<String>,

    /// Names of modules that must be applied before this one
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub variables: Vec<VariableConfig>,

    /// Preconfigured variable values, overridden by user-supplied ones
    #[serde(default)]
    pub presets: BTreeMap<String, String>,
}

impl ModuleConfig {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            terraform_version: None,
            dependencies: Vec::new(),
            variables: Vec::new(),
            presets: BTreeMap::new(),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variable(mut self, variable: VariableConfig) -> Self {
        self.variables.push(variable);
        self
    }

    pub fn with_preset(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.presets.insert(name.into(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&VariableConfig> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A variable declared by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableConfig {
    pub name: String,

    /// Binding fails if no value resolves for this variable
    #[serde(default)]
    pub required: bool,

    /// Allowed values; empty means unrestricted
    #[serde(default)]
    pub values: Vec<String>,

    /// Command-line flag name, defaults to the variable name with `_` replaced by `-`
    #[serde(default)]
    pub flag: Option<String>,
}

impl VariableConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            values: Vec::new(),
            flag: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Whether `value` is acceptable for this variable
    pub fn allows(&self, value: &str) -> bool {
        self.values.is_empty() || self.values.iter().any(|v| v == value)
    }

    pub fn flag_name(&self) -> String {
        self.flag
            .clone()
            .unwrap_or_else(|| self.name.replace('_', "-"))
    }
}
