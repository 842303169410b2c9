//! Evaluate a declarative pipeline against a saved container.

use anyhow::{Context, Result};
use pipetree_core::{Container, PipelineDefinition};
use std::path::Path;
use tracing::info;

pub fn run(pipeline: &Path, input: &Path, output: &Path) -> Result<String> {
    let definition = PipelineDefinition::from_path(pipeline)
        .with_context(|| format!("failed to read pipeline {}", pipeline.display()))?;
    let mut pipeline = definition.build(&pipetree_steps::default_registry())?;

    let mut container = Container::load(input)
        .with_context(|| format!("failed to load {}", input.display()))?;
    info!(pipeline = %pipeline.name(), steps = pipeline.len(), "running pipeline");

    pipeline.eval(&mut container)?;
    container
        .save(output)
        .with_context(|| format!("failed to save {}", output.display()))?;

    let mut report = format!(
        "pipeline '{}' finished; {} node(s) saved to {}\n",
        pipeline.name(),
        container.node_count(),
        output.display()
    );
    if let Some(log) = pipeline.last_run() {
        report.push_str(&log.to_json()?);
        report.push('\n');
    }
    Ok(report)
}
