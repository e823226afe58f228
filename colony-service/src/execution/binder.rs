// Execution Binder
// Pairs modules with resolved variable values, all-or-nothing

use crate::execution::graph::DependencyNode;
use crate::execution::module::Module;
use crate::execution::variables::UserVariables;

use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while binding variables to executions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("module '{module}' requires variable '{variable}' but no value was provided")]
    MissingRequiredVariable { module: String, variable: String },

    #[error(
        "invalid value '{value}' for variable '{variable}' of module '{module}', expected one of [{}]",
        .allowed.join(", ")
    )]
    InvalidEnumValue {
        module: String,
        variable: String,
        value: String,
        allowed: Vec<String>,
    },
}

/// A module awaiting variable resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    module: Arc<Module>,
}

impl Execution {
    pub fn new(module: Arc<Module>) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Resolve every declared variable: user value, then preset, then unset
    pub fn bind(&self, user_vars: &UserVariables) -> Result<BoundExecution, BindError> {
        let mut variables = BTreeMap::new();

        for spec in self.module.variables() {
            let value = match user_vars.get(&spec.name) {
                Some(value) if !spec.allows(value) => {
                    return Err(BindError::InvalidEnumValue {
                        module: self.name().to_string(),
                        variable: spec.name.clone(),
                        value: value.to_string(),
                        allowed: spec.values.clone(),
                    });
                }
                Some(value) => Some(value),
                None => self.module.preset(&spec.name).filter(|v| !v.is_empty()),
            };

            match value {
                Some(value) => {
                    variables.insert(spec.name.clone(), value.to_string());
                }
                None if spec.required => {
                    return Err(BindError::MissingRequiredVariable {
                        module: self.name().to_string(),
                        variable: spec.name.clone(),
                    });
                }
                None => {}
            }
        }

        Ok(BoundExecution {
            module: Arc::clone(&self.module),
            variables,
        })
    }
}

impl DependencyNode for Execution {
    fn node_name(&self) -> &str {
        self.module.name()
    }

    fn node_dependencies(&self) -> &[String] {
        self.module.dependencies()
    }
}

/// Executions in configuration order
#[derive(Debug, Clone, Default)]
pub struct ExecutionSet {
    executions: Vec<Execution>,
}

impl ExecutionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, execution: Execution) {
        self.executions.push(execution);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Execution> {
        self.executions.iter()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.executions.iter().map(Execution::name).collect()
    }

    pub fn into_vec(self) -> Vec<Execution> {
        self.executions
    }

    /// Bind every execution; a single failure fails the whole set
    pub fn bind_all(&self, user_vars: &UserVariables) -> Result<Vec<BoundExecution>, BindError> {
        let bound = self
            .executions
            .iter()
            .map(|execution| execution.bind(user_vars))
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(executions = bound.len(), "bound executions");
        Ok(bound)
    }
}

impl FromIterator<Execution> for ExecutionSet {
    fn from_iter<I: IntoIterator<Item = Execution>>(iter: I) -> Self {
        Self {
            executions: iter.into_iter().collect(),
        }
    }
}

/// A module with every variable resolved and validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundExecution {
    module: Arc<Module>,
    variables: BTreeMap<String, String>,
}

impl BoundExecution {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    /// Final variable values, keyed by variable name
    pub fn variables(&self) -> &BTreeMap<String, String> {
        &self.variables
    }

    pub fn value(&self, variable: &str) -> Option<&str> {
        self.variables.get(variable).map(String::as_str)
    }
}

impl DependencyNode for BoundExecution {
    fn node_name(&self) -> &str {
        self.module.name()
    }

    fn node_dependencies(&self) -> &[String] {
        self.module.dependencies()
    }
}
