//! Startup-time registry of callable functions
//!
//! Binds `(module path, dotted function name)` to a Rust closure. The
//! registry is filled before the server starts and only read afterwards.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::args::Kwargs;
use super::value::ApiValue;

/// A callable registered for dispatch
pub type ApiFunction = Arc<dyn Fn(&Kwargs) -> Result<ApiValue, CallError> + Send + Sync>;

/// Failure raised by a registered function
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{function}() got an unexpected keyword argument '{name}'")]
    UnexpectedArgument { function: String, name: String },

    #[error("{function}() missing required argument: '{name}'")]
    MissingArgument { function: String, name: String },

    #[error("{0}")]
    Failed(String),
}

#[derive(Default)]
pub struct Registry {
    modules: BTreeMap<String, HashMap<String, ApiFunction>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (module, functions) in &self.modules {
            let mut names: Vec<&String> = functions.keys().collect();
            names.sort();
            map.entry(module, &names);
        }
        map.finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under a dotted module path, replacing any previous one
    pub fn register<F>(&mut self, module: &str, function: &str, f: F)
    where
        F: Fn(&Kwargs) -> Result<ApiValue, CallError> + Send + Sync + 'static,
    {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(function.to_string(), Arc::new(f));
    }

    /// A module is importable once anything is registered for it
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn get(&self, module: &str, function: &str) -> Option<ApiFunction> {
        self.modules.get(module)?.get(function).cloned()
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Total number of registered functions
    pub fn len(&self) -> usize {
        self.modules.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        registry.register("agasc", "get_star", |_| Ok(ApiValue::Int(1)));
        registry.register("agasc", "get_stars", |_| Ok(ApiValue::Int(2)));

        assert!(registry.has_module("agasc"));
        assert!(!registry.has_module("mica"));
        assert_eq!(registry.len(), 2);

        let f = registry.get("agasc", "get_star").unwrap();
        assert_eq!(f(&Kwargs::default()).unwrap(), ApiValue::Int(1));
        assert!(registry.get("agasc", "get_agasc_cone").is_none());
    }
}
