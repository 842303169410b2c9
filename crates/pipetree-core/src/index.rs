//! Name Index: tree-wide name → node resolution
//!
//! The index is derived state. It is rebuilt from the tree whenever a
//! structural check needs it and is never persisted.

use crate::container::Container;
use crate::error::{PipetreeError, Result};
use std::collections::HashMap;

/// Position of a node below a root, as child offsets from the root down.
pub type NodePath = Vec<usize>;

#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    paths: HashMap<String, NodePath>,
}

impl NameIndex {
    /// Index every node under `root` (inclusive), failing on the first
    /// repeated name.
    pub fn build(root: &Container) -> Result<Self> {
        let mut index = NameIndex::default();
        let mut path = Vec::new();
        index.visit(root, &mut path)?;
        Ok(index)
    }

    fn visit(&mut self, node: &Container, path: &mut NodePath) -> Result<()> {
        if self.paths.contains_key(node.name()) {
            return Err(PipetreeError::DuplicateName(node.name().to_string()));
        }
        self.paths.insert(node.name().to_string(), path.clone());

        for (position, child) in node.children().iter().enumerate() {
            path.push(position);
            self.visit(child, path)?;
            path.pop();
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    pub fn path_of(&self, name: &str) -> Option<&[usize]> {
        self.paths.get(name).map(Vec::as_slice)
    }

    /// First name of `subtree` already present in this index, skipping any
    /// name listed in `ignore`.
    pub fn first_collision(&self, subtree: &Container, ignore: &[String]) -> Option<String> {
        subtree
            .list_names()
            .into_iter()
            .find(|name| self.contains(name) && !ignore.contains(name))
    }
}
