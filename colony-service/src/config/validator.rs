// Colony Config Validator
// Structural checks run before any module is bound or executed

use crate::config::models::{ColonyConfig, ModuleConfig};
use crate::config::ConfigError;
use crate::utils::is_safe_name;

use std::collections::HashSet;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a colony config, reporting every problem found
    pub fn validate(config: &ColonyConfig) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        let mut seen = HashSet::new();

        for (index, module) in config.modules.iter().enumerate() {
            if module.name.trim().is_empty() {
                problems.push(format!("module #{} has an empty name", index + 1));
            } else if !is_safe_name(&module.name) {
                problems.push(format!(
                    "module name '{}' may only contain letters, digits, '-' and '_' and must not start with '.'",
                    module.name
                ));
            } else if !seen.insert(module.name.as_str()) {
                problems.push(format!("module '{}' is defined more than once", module.name));
            }
            Self::validate_module(module, &mut problems);
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    fn validate_module(module: &ModuleConfig, problems: &mut Vec<String>) {
        let mut names = HashSet::new();

        for variable in &module.variables {
            if variable.name.trim().is_empty() {
                problems.push(format!("module '{}' declares a variable with no name", module.name));
                continue;
            }
            if !names.insert(variable.name.as_str()) {
                problems.push(format!(
                    "module '{}' declares variable '{}' more than once",
                    module.name, variable.name
                ));
            }
            if variable.values.iter().any(|v| v.is_empty()) {
                problems.push(format!(
                    "variable '{}' of module '{}' lists an empty allowed value",
                    variable.name, module.name
                ));
            }
            if !is_valid_flag(&variable.flag_name()) {
                problems.push(format!(
                    "variable '{}' of module '{}' maps to invalid flag '--{}'",
                    variable.name,
                    module.name,
                    variable.flag_name()
                ));
            }
        }

        for (name, value) in &module.presets {
            match module.variable(name) {
                None => problems.push(format!(
                    "module '{}' has a preset for undeclared variable '{}'",
                    module.name, name
                )),
                Some(variable) if !variable.allows(value) => problems.push(format!(
                    "preset '{}' for variable '{}' of module '{}' is not one of [{}]",
                    value,
                    name,
                    module.name,
                    variable.values.join(", ")
                )),
                Some(_) => {}
            }
        }

        if module.dependencies.iter().any(|d| d == &module.name) {
            problems.push(format!("module '{}' depends on itself", module.name));
        }
    }
}

/// Long flags must start with an alphanumeric and contain only `[A-Za-z0-9_-]`
pub(crate) fn is_valid_flag(flag: &str) -> bool {
    let mut chars = flag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
