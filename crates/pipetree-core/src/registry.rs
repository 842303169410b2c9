//! Step Registry: named step functions for declarative pipelines
use crate::container::Container;
use crate::error::{PipetreeError, Result};
use crate::step::{SharedStepFunction, Step, StepFunction};
use crate::value::Mapping;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct StepRegistry {
    functions: BTreeMap<String, SharedStepFunction>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure or function item, replacing any earlier entry of
    /// the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&mut Container, &Mapping) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        function: impl StepFunction + 'static,
    ) -> &mut Self {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn get(&self, name: &str) -> Option<&SharedStepFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.functions.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Build a step named `step_name` that calls the registered `function`.
    pub fn step(&self, step_name: &str, function: &str, kwargs: Mapping) -> Result<Step> {
        let shared = self
            .get(function)
            .ok_or_else(|| PipetreeError::NotFound(function.to_string()))?;
        Ok(Step::from_shared(step_name, Arc::clone(shared), kwargs))
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("functions", &self.names())
            .finish()
    }
}
