//! Pipeline: ordered, named steps
//!
//! Step names are unique within one pipeline. This namespace is separate
//! from the names inside a container tree.

use crate::error::{PipetreeError, Result};
use crate::eval_log::EvalLog;
use crate::step::Step;
use crate::value::Mapping;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Pipeline {
    name: String,
    pub(crate) steps: Vec<Step>,
    log_eval: bool,
    pub(crate) last_run: Option<EvalLog>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            log_eval: false,
            last_run: None,
        }
    }

    /// Enable or disable evaluation logging.
    pub fn with_log_eval(mut self, log_eval: bool) -> Self {
        self.log_eval = log_eval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn log_eval(&self) -> bool {
        self.log_eval
    }

    pub fn set_log_eval(&mut self, log_eval: bool) {
        self.log_eval = log_eval;
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Log of the most recent run made with `log_eval` enabled.
    pub fn last_run(&self) -> Option<&EvalLog> {
        self.last_run.as_ref()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name() == name)
    }

    /// Append steps in order. Nothing is appended unless every new name is
    /// free, including among the new steps themselves.
    pub fn add_steps(&mut self, steps: impl IntoIterator<Item = Step>) -> Result<()> {
        let steps: Vec<Step> = steps.into_iter().collect();
        {
            let mut seen: HashSet<&str> = self.steps.iter().map(Step::name).collect();
            for step in &steps {
                if !seen.insert(step.name()) {
                    return Err(PipetreeError::DuplicateName(step.name().to_string()));
                }
            }
        }
        for step in steps {
            debug!(pipeline = %self.name, step = step.name(), "adding step");
            self.steps.push(step);
        }
        Ok(())
    }

    pub fn add_step(&mut self, step: Step) -> Result<()> {
        self.add_steps([step])
    }

    /// The named step and its position.
    pub fn get_step(&self, name: &str) -> Option<(&Step, usize)> {
        self.position(name).map(|i| (&self.steps[i], i))
    }

    /// Swap the named step for `step` at the same position. The new name may
    /// differ but must not belong to another step. Returns the old step.
    pub fn replace_step(&mut self, name: &str, step: Step) -> Result<Step> {
        let index = self
            .position(name)
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        if step.name() != name && self.position(step.name()).is_some() {
            return Err(PipetreeError::DuplicateName(step.name().to_string()));
        }
        debug!(pipeline = %self.name, old = name, new = step.name(), index, "replacing step");
        Ok(std::mem::replace(&mut self.steps[index], step))
    }

    pub fn remove_step(&mut self, name: &str) -> Result<Step> {
        let index = self
            .position(name)
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        debug!(pipeline = %self.name, step = name, "removing step");
        Ok(self.steps.remove(index))
    }

    /// Best-effort batch removal. Returns the names that were not present.
    pub fn remove_steps<I, S>(&mut self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut missing = Vec::new();
        for name in names {
            let name = name.as_ref();
            if self.remove_step(name).is_err() {
                missing.push(name.to_string());
            }
        }
        if !missing.is_empty() {
            warn!(pipeline = %self.name, ?missing, "steps not found during removal");
        }
        missing
    }

    /// Shallow-merge `updates` into the named step's kwargs.
    pub fn set_step_kwargs(&mut self, name: &str, updates: Mapping) -> Result<()> {
        let index = self
            .position(name)
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        debug!(pipeline = %self.name, step = name, keys = updates.len(), "updating kwargs");
        self.steps[index].kwargs_mut().extend(updates);
        Ok(())
    }
}
