//! Read-only views of a saved container.

use anyhow::{Context, Result};
use pipetree_core::Container;
use std::path::Path;

fn open(dir: &Path) -> Result<Container> {
    Container::load(dir).with_context(|| format!("failed to load {}", dir.display()))
}

pub fn describe(dir: &Path, json: bool) -> Result<String> {
    let root = open(dir)?;
    if json {
        let mut shape = serde_json::Map::new();
        shape.insert(root.name().to_string(), serde_json::to_value(root.describe())?);
        return Ok(format!("{}\n", serde_json::to_string_pretty(&shape)?));
    }
    Ok(root.to_string())
}

pub fn names(dir: &Path) -> Result<String> {
    let root = open(dir)?;
    Ok(root
        .list_names()
        .into_iter()
        .map(|name| name + "\n")
        .collect())
}

pub fn header(dir: &Path, node: Option<&str>) -> Result<String> {
    let root = open(dir)?;
    let target = node.unwrap_or(root.name());
    let found = root
        .lookup(target)
        .with_context(|| format!("no node named '{}'", target))?;

    let header: serde_json::Map<String, serde_json::Value> = found
        .header()
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    Ok(format!("{}\n", serde_json::to_string_pretty(&header)?))
}
