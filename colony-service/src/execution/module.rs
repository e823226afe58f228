// Module
// Immutable, loaded view of a configured terraform module

use crate::config::models::{ModuleConfig, VariableConfig};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A named unit of terraform code with declared variables and dependencies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    name: String,
    source: PathBuf,
    terraform_version: Option<String>,
    dependencies: Vec<String>,
    variables: Vec<VariableConfig>,
    presets: BTreeMap<String, String>,
}

impl Module {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Module-local terraform version override
    pub fn terraform_version(&self) -> Option<&str> {
        self.terraform_version.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn variables(&self) -> &[VariableConfig] {
        &self.variables
    }

    pub fn preset(&self, variable: &str) -> Option<&str> {
        self.presets.get(variable).map(String::as_str)
    }
}

impl From<&ModuleConfig> for Module {
    fn from(config: &ModuleConfig) -> Self {
        Self {
            name: config.name.clone(),
            source: config.source.clone(),
            terraform_version: config.terraform_version.clone(),
            dependencies: config.dependencies.clone(),
            variables: config.variables.clone(),
            presets: config.presets.clone(),
        }
    }
}

impl From<ModuleConfig> for Module {
    fn from(config: ModuleConfig) -> Self {
        Self {
            name: config.name,
            source: config.source,
            terraform_version: config.terraform_version,
            dependencies: config.dependencies,
            variables: config.variables,
            presets: config.presets,
        }
    }
}
