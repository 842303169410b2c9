//! Step: a named, independently configured unit of work
use crate::container::Container;
use crate::value::Mapping;
use std::fmt;
use std::sync::Arc;

/// Contract for step functions: process the container in place through an
/// exclusive borrow. A step may also swap in a whole new tree. On failure
/// the caller keeps the container as the step left it.
pub trait StepFunction: Send + Sync {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()>;
}

impl<F> StepFunction for F
where
    F: Fn(&mut Container, &Mapping) -> anyhow::Result<()> + Send + Sync,
{
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        self(container, kwargs)
    }
}

/// Shared handle to a step function.
pub type SharedStepFunction = Arc<dyn StepFunction>;

#[derive(Clone)]
pub struct Step {
    name: String,
    function: SharedStepFunction,
    kwargs: Mapping,
}

impl Step {
    /// Step from a closure or function item with empty kwargs.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut Container, &Mapping) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::with_kwargs(name, function, Mapping::new())
    }

    pub fn with_kwargs<F>(name: impl Into<String>, function: F, kwargs: Mapping) -> Self
    where
        F: Fn(&mut Container, &Mapping) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_shared(name, Arc::new(function), kwargs)
    }

    /// Step from any [`StepFunction`] implementation, e.g. a configured struct.
    pub fn from_function(
        name: impl Into<String>,
        function: impl StepFunction + 'static,
        kwargs: Mapping,
    ) -> Self {
        Self::from_shared(name, Arc::new(function), kwargs)
    }

    pub fn from_shared(name: impl Into<String>, function: SharedStepFunction, kwargs: Mapping) -> Self {
        Self {
            name: name.into(),
            function,
            kwargs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kwargs(&self) -> &Mapping {
        &self.kwargs
    }

    pub fn kwargs_mut(&mut self) -> &mut Mapping {
        &mut self.kwargs
    }

    pub fn function(&self) -> &SharedStepFunction {
        &self.function
    }

    /// Invoke the function with this step's kwargs.
    pub fn call(&self, container: &mut Container) -> anyhow::Result<()> {
        self.function.run(container, &self.kwargs)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("kwargs", &self.kwargs)
            .finish_non_exhaustive()
    }
}
