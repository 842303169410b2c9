use crate::kwargs::{optional_str, required_str, string_list};
use anyhow::{bail, Context};
use pipetree_core::{Container, Mapping, StepFunction};
use tracing::debug;

/// Deletes every node listed in `names`; names already absent are skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropNodesStep;

impl StepFunction for DropNodesStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        for name in string_list(kwargs, "names")? {
            if container.contains(&name) {
                container.delete(&name)?;
            } else {
                debug!(node = %name, "drop_nodes: already absent");
            }
        }
        Ok(())
    }
}

/// Copies leaf `from`, with its header and meta, to a new leaf `to` placed
/// under `parent` (the root when omitted).
#[derive(Debug, Default, Clone, Copy)]
pub struct CopyNodeStep;

impl StepFunction for CopyNodeStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        let from = required_str(kwargs, "from")?;
        let to = required_str(kwargs, "to")?;

        let source = container
            .lookup(from)
            .with_context(|| format!("copy_node: no node named '{}'", from))?;
        let Some(value) = source.value() else {
            bail!("copy_node: '{}' is a branch; only leaves can be copied", from);
        };
        let copy = Container::with_metadata(
            to,
            value.clone(),
            source.header().clone(),
            source.meta().clone(),
        )?;

        let parent = optional_str(kwargs, "parent")?
            .unwrap_or(container.name())
            .to_string();
        container.attach_under(&parent, copy)?;
        Ok(())
    }
}

/// Renames node `from` to `to`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RenameNodeStep;

impl StepFunction for RenameNodeStep {
    fn run(&self, container: &mut Container, kwargs: &Mapping) -> anyhow::Result<()> {
        let from = required_str(kwargs, "from")?;
        let to = required_str(kwargs, "to")?;
        container.rename(from, to)?;
        Ok(())
    }
}
