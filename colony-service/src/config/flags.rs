// Command-line Flag Derivation
// One flag per distinct variable name across every module of the colony

use crate::config::models::ColonyConfig;
use crate::config::validator::is_valid_flag;
use crate::config::ConfigError;

/// Flags owned by the CLI itself; variables may not shadow them
pub const RESERVED_FLAGS: &[&str] = &["config", "verbose", "trace", "detach", "help", "version"];

/// A command-line flag that sets a terraform variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableFlag {
    /// Long flag name, without the leading dashes
    pub flag: String,
    /// Terraform variable name the flag sets
    pub variable: String,
    /// Allowed values; empty means unrestricted
    pub allowed_values: Vec<String>,
    /// Some module requires the variable and has no preset for it
    pub required: bool,
    /// Modules that declare the variable
    pub modules: Vec<String>,
}

/// Derive the variable flags for a colony
///
/// Modules sharing a flag must agree on the variable it sets and on the
/// allowed values; the flag is required if any module requires the variable
/// without presetting it.
pub fn command_line_flags(config: &ColonyConfig) -> Result<Vec<VariableFlag>, ConfigError> {
    let mut flags: Vec<VariableFlag> = Vec::new();
    let mut problems = Vec::new();

    for module in &config.modules {
        for variable in &module.variables {
            let flag_name = variable.flag_name();
            let required = variable.required && !module.presets.contains_key(&variable.name);

            if RESERVED_FLAGS.contains(&flag_name.as_str()) || !is_valid_flag(&flag_name) {
                problems.push(format!(
                    "variable '{}' of module '{}' cannot use flag '--{}'",
                    variable.name, module.name, flag_name
                ));
                continue;
            }

            match flags.iter_mut().find(|f| f.flag == flag_name) {
                Some(existing) => {
                    if existing.variable != variable.name {
                        problems.push(format!(
                            "flag '--{}' is used for both '{}' and '{}'",
                            flag_name, existing.variable, variable.name
                        ));
                        continue;
                    }
                    if !same_values(&existing.allowed_values, &variable.values) {
                        problems.push(format!(
                            "variable '{}' has conflicting allowed values in modules '{}' and '{}'",
                            variable.name,
                            existing.modules.join("', '"),
                            module.name
                        ));
                        continue;
                    }
                    existing.required |= required;
                    existing.modules.push(module.name.clone());
                }
                None => flags.push(VariableFlag {
                    flag: flag_name,
                    variable: variable.name.clone(),
                    allowed_values: variable.values.clone(),
                    required,
                    modules: vec![module.name.clone()],
                }),
            }
        }
    }

    if problems.is_empty() {
        Ok(flags)
    } else {
        Err(ConfigError::Invalid(problems))
    }
}

fn same_values(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&String> = a.iter().collect();
    let mut b: Vec<&String> = b.iter().collect();
    a.sort();
    b.sort();
    a == b
}
