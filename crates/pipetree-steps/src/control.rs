use crate::kwargs::required_str;
use pipetree_core::{Container, Mapping, StepFunction, Value};
use tracing::info;

/// Requests early stop unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct StopStep;

impl StepFunction for StopStep {
    fn run(&self, container: &mut Container, _kwargs: &Mapping) -> anyhow::Result<()> {
        info!(root = container.name(), "stop requested");
        container.request_early_stop();
        Ok(())
    }
}

/// Requests early stop when the root header entry `key` is truthy.
#[derive(Debug, Default, Clone, Copy)]
pub struct StopIfStep;

impl StepFunction for StopIfStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        let key = required_str(kwargs, "key")?;
        let triggered = container
            .header()
            .get(key)
            .map(Value::is_truthy)
            .unwrap_or(false);
        if triggered {
            info!(root = container.name(), key, "stop condition met");
            container.request_early_stop();
        }
        Ok(())
    }
}
