// User Variables
// Caller-supplied variable values for one invocation

use std::collections::HashMap;

/// Mapping from variable name to a value supplied by the caller
///
/// Empty strings are treated as "not supplied", which is what an unset
/// command-line flag produces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserVariables {
    values: HashMap<String, String>,
}

impl UserVariables {
    /// No variables supplied
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(_, v)| !v.is_empty())
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.values.insert(name.into(), value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}
