use crate::kwargs::{optional_str, required, required_str};
use anyhow::Context;
use pipetree_core::{Container, Mapping, StepFunction};
use tracing::debug;

/// Writes `value` under header `key` of `target` (the root when omitted).
#[derive(Debug, Default, Clone, Copy)]
pub struct SetHeaderStep;

impl StepFunction for SetHeaderStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        let key = required_str(kwargs, "key")?.to_string();
        let value = required(kwargs, "value")?.clone();
        let target = optional_str(kwargs, "target")?.unwrap_or(container.name()).to_string();

        let mut node = container
            .lookup_mut(&target)
            .with_context(|| format!("set_header: no node named '{}'", target))?;
        debug!(node = %target, key = %key, "setting header");
        node.header_mut().insert(key, value);
        Ok(())
    }
}

/// Writes `value` under meta `key` of `target`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetMetaStep;

impl StepFunction for SetMetaStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        let target = required_str(kwargs, "target")?;
        let key = required_str(kwargs, "key")?.to_string();
        let value = required(kwargs, "value")?.clone();

        let mut node = container
            .lookup_mut(target)
            .with_context(|| format!("set_meta: no node named '{}'", target))?;
        debug!(node = target, key = %key, "setting meta");
        node.meta_mut().insert(key, value);
        Ok(())
    }
}
