//! Container: name-addressed tree of payloads with header and meta mappings
//!
//! Every node carries a name that is unique across the whole tree it
//! belongs to, so any node can be reached from the root by name alone.
//!
//! ```text
//! root            (branch)
//! ├── array_1     (leaf: list)
//! └── group       (branch)
//!     └── labels  (leaf: list)
//! ```
//!
//! Structural mutation (add, attach, delete, set, rename) always goes
//! through the root so tree-wide uniqueness can be checked. Handles
//! returned by [`Container::lookup_mut`] only allow edits that keep the
//! set of names unchanged.

use crate::error::{PipetreeError, Result};
use crate::index::NameIndex;
use crate::value::{Mapping, Value};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::any::Any;
use std::fmt;
use std::ops::{Deref, Index};
use tracing::debug;

/// Reserved header key read by the evaluator after every step.
pub const EARLY_STOP_KEY: &str = "stop_eval";

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single opaque value, not addressable by name.
    Leaf(Value),
    /// Ordered child nodes. Only branches accept new children.
    Branch(Vec<Container>),
}

impl Payload {
    /// Record length used by the meta length check.
    pub fn len(&self) -> Option<usize> {
        match self {
            Payload::Leaf(value) => value.len(),
            Payload::Branch(children) => Some(children.len()),
        }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self, Payload::Branch(_))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Leaf(value)
    }
}

impl From<Vec<Container>> for Payload {
    fn from(children: Vec<Container>) -> Self {
        Payload::Branch(children)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    name: String,
    payload: Payload,
    header: Mapping,
    meta: Mapping,
}

impl Container {
    pub fn new(name: impl Into<String>, payload: impl Into<Payload>) -> Result<Self> {
        Self::with_metadata(name, payload, Mapping::new(), Mapping::new())
    }

    /// Build a node, validating absorbed children for name collisions and
    /// every meta entry that declares a length against the payload length.
    pub fn with_metadata(
        name: impl Into<String>,
        payload: impl Into<Payload>,
        header: Mapping,
        meta: Mapping,
    ) -> Result<Self> {
        let node = Self {
            name: name.into(),
            payload: payload.into(),
            header,
            meta,
        };
        node.check_meta_lengths()?;
        if node.payload.is_branch() {
            NameIndex::build(&node)?;
        }
        Ok(node)
    }

    /// Reassemble a node from stored parts without the meta length check.
    /// Lengths are only enforced when a node is first built, and later edits
    /// through `meta_mut` or `set_value` may legitimately diverge.
    pub(crate) fn restore(name: String, payload: Payload, header: Mapping, meta: Mapping) -> Self {
        Self {
            name,
            payload,
            header,
            meta,
        }
    }

    /// An empty, extensible branch.
    pub fn branch(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Branch(Vec::new()),
            header: Mapping::new(),
            meta: Mapping::new(),
        }
    }

    /// A fixed leaf without metadata.
    pub fn leaf(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Leaf(value.into()),
            header: Mapping::new(),
            meta: Mapping::new(),
        }
    }

    fn check_meta_lengths(&self) -> Result<()> {
        let payload_len = self.payload.len();
        for (key, value) in &self.meta {
            if let Some(meta_len) = value.len() {
                if payload_len != Some(meta_len) {
                    return Err(PipetreeError::MetaLengthMismatch {
                        key: key.clone(),
                        meta_len,
                        payload_len,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn header(&self) -> &Mapping {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Mapping {
        &mut self.header
    }

    pub fn meta(&self) -> &Mapping {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Mapping {
        &mut self.meta
    }

    pub fn is_extensible(&self) -> bool {
        self.payload.is_branch()
    }

    /// Direct children; empty for leaves.
    pub fn children(&self) -> &[Container] {
        match &self.payload {
            Payload::Branch(children) => children,
            Payload::Leaf(_) => &[],
        }
    }

    /// Leaf value, if this node is a leaf.
    pub fn value(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Leaf(value) => Some(value),
            Payload::Branch(_) => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut Value> {
        match &mut self.payload {
            Payload::Leaf(value) => Some(value),
            Payload::Branch(_) => None,
        }
    }

    /// Downcast an opaque leaf value.
    pub fn value_as<T: Any>(&self) -> Option<&T> {
        self.value()?.downcast_ref::<T>()
    }

    // ------------------------------------------------------------------
    // Name resolution
    // ------------------------------------------------------------------

    /// Find a node anywhere in this subtree (inclusive). Never searches
    /// outside the subtree.
    pub fn lookup(&self, name: &str) -> Option<&Container> {
        if self.name == name {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.lookup(name))
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<NodeMut<'_>> {
        self.find_mut(name).map(|node| NodeMut { node })
    }

    /// Lookup that creates an empty (`Null`) leaf child of this node when
    /// the name is absent.
    pub fn lookup_or_create(&mut self, name: &str) -> Result<NodeMut<'_>> {
        if self.lookup(name).is_some() {
            return self
                .lookup_mut(name)
                .ok_or_else(|| PipetreeError::NotFound(name.to_string()));
        }
        self.attach(Container::leaf(name, Value::Null))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Container> {
        if self.name == name {
            return Some(self);
        }
        match &mut self.payload {
            Payload::Branch(children) => children.iter_mut().find_map(|child| child.find_mut(name)),
            Payload::Leaf(_) => None,
        }
    }

    fn node_at_mut(&mut self, path: &[usize]) -> Option<&mut Container> {
        match path.split_first() {
            None => Some(self),
            Some((&position, rest)) => match &mut self.payload {
                Payload::Branch(children) => children.get_mut(position)?.node_at_mut(rest),
                Payload::Leaf(_) => None,
            },
        }
    }

    // ------------------------------------------------------------------
    // Structural mutation
    // ------------------------------------------------------------------

    /// Construct a child of this node and attach it.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<NodeMut<'_>> {
        let child = Container::new(name, payload)?;
        self.attach(child)
    }

    pub fn add_with_metadata(
        &mut self,
        name: impl Into<String>,
        payload: impl Into<Payload>,
        header: Mapping,
        meta: Mapping,
    ) -> Result<NodeMut<'_>> {
        let child = Container::with_metadata(name, payload, header, meta)?;
        self.attach(child)
    }

    /// Construct a node and attach it below the named branch.
    pub fn add_under(
        &mut self,
        parent: &str,
        name: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<NodeMut<'_>> {
        let child = Container::new(name, payload)?;
        self.attach_under(parent, child)
    }

    /// Attach a prebuilt subtree as the last child of this node.
    pub fn attach(&mut self, child: Container) -> Result<NodeMut<'_>> {
        let parent = self.name.clone();
        self.attach_under(&parent, child)
    }

    /// Attach a prebuilt subtree as the last child of the named branch. The
    /// tree is left untouched on failure.
    pub fn attach_under(&mut self, parent: &str, child: Container) -> Result<NodeMut<'_>> {
        let index = NameIndex::build(self)?;
        if let Some(name) = index.first_collision(&child, &[]) {
            return Err(PipetreeError::DuplicateName(name));
        }
        let target = self
            .find_mut(parent)
            .ok_or_else(|| PipetreeError::NotFound(parent.to_string()))?;
        match &mut target.payload {
            Payload::Branch(children) => {
                debug!(parent, child = %child.name, "attaching node");
                children.push(child);
                let node = children
                    .last_mut()
                    .ok_or_else(|| PipetreeError::NotFound(parent.to_string()))?;
                Ok(NodeMut { node })
            }
            Payload::Leaf(_) => Err(PipetreeError::NotExtendable(parent.to_string())),
        }
    }

    /// Detach the named node, with its subtree, from wherever it lives
    /// below this node. A missing name, or the name of this node itself,
    /// fails with `NotFound`.
    pub fn delete(&mut self, name: &str) -> Result<Container> {
        let index = NameIndex::build(self)?;
        let path = match index.path_of(name) {
            Some(path) if !path.is_empty() => path.to_vec(),
            _ => return Err(PipetreeError::NotFound(name.to_string())),
        };
        let (position, parent_path) = path
            .split_last()
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        let parent = self
            .node_at_mut(parent_path)
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        match &mut parent.payload {
            Payload::Branch(children) => {
                debug!(node = name, parent = %parent.name, "deleting node");
                Ok(children.remove(*position))
            }
            Payload::Leaf(_) => Err(PipetreeError::NotFound(name.to_string())),
        }
    }

    /// Indexed assignment. An existing node called `name` is replaced
    /// wholesale, with no merge of header or meta; otherwise `node` becomes a
    /// new child of this node. `node` is renamed to `name` either way.
    /// Returns the replaced subtree, if any.
    pub fn set(&mut self, name: &str, mut node: Container) -> Result<Option<Container>> {
        node.name = name.to_string();
        NameIndex::build(&node)?;

        let replaced_names = match self.lookup(name) {
            Some(existing) => existing.list_names(),
            None => {
                self.attach(node)?;
                return Ok(None);
            }
        };

        let index = NameIndex::build(self)?;
        if let Some(collision) = index.first_collision(&node, &replaced_names) {
            return Err(PipetreeError::DuplicateName(collision));
        }

        let slot = self
            .find_mut(name)
            .ok_or_else(|| PipetreeError::NotFound(name.to_string()))?;
        debug!(node = name, "overwriting node");
        Ok(Some(std::mem::replace(slot, node)))
    }

    /// Rename a node in place, keeping its position, payload and metadata.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return match self.contains(from) {
                true => Ok(()),
                false => Err(PipetreeError::NotFound(from.to_string())),
            };
        }
        if self.contains(to) {
            return Err(PipetreeError::DuplicateName(to.to_string()));
        }
        let node = self
            .find_mut(from)
            .ok_or_else(|| PipetreeError::NotFound(from.to_string()))?;
        debug!(from, to, "renaming node");
        node.name = to.to_string();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// All names in this subtree, pre-order, children in insertion order.
    pub fn list_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_names(&mut names);
        names
    }

    fn collect_names(&self, names: &mut Vec<String>) {
        names.push(self.name.clone());
        for child in self.children() {
            child.collect_names(names);
        }
    }

    /// Shape of this subtree without payload contents.
    pub fn describe(&self) -> Shape {
        match &self.payload {
            Payload::Leaf(value) => Shape::Leaf(value.type_name().to_string()),
            Payload::Branch(children) => Shape::Branch(
                children
                    .iter()
                    .map(|child| (child.name.clone(), child.describe()))
                    .collect(),
            ),
        }
    }

    /// Total number of nodes in this subtree, including this one.
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Container::node_count).sum::<usize>()
    }

    pub fn request_early_stop(&mut self) {
        self.header.insert(EARLY_STOP_KEY.to_string(), Value::Bool(true));
    }

    pub fn early_stop_requested(&self) -> bool {
        self.header
            .get(EARLY_STOP_KEY)
            .map(Value::is_truthy)
            .unwrap_or(false)
    }
}

impl Index<&str> for Container {
    type Output = Container;

    fn index(&self, name: &str) -> &Container {
        self.lookup(name)
            .unwrap_or_else(|| panic!("no node named '{}' under '{}'", name, self.name))
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.describe().write_tree(f, 1)
    }
}

/// Mutable handle to a node inside a tree.
///
/// Allows header, meta and leaf value edits. Adding, removing or renaming
/// nodes goes through the owning root instead.
#[derive(Debug)]
pub struct NodeMut<'a> {
    node: &'a mut Container,
}

impl NodeMut<'_> {
    pub fn header_mut(&mut self) -> &mut Mapping {
        &mut self.node.header
    }

    pub fn meta_mut(&mut self) -> &mut Mapping {
        &mut self.node.meta
    }

    pub fn value_mut(&mut self) -> Option<&mut Value> {
        self.node.value_mut()
    }

    /// Replace a leaf value. Branch payloads cannot be swapped for a value.
    pub fn set_value(&mut self, value: impl Into<Value>) -> Result<()> {
        match self.node.value_mut() {
            Some(slot) => {
                *slot = value.into();
                Ok(())
            }
            None => Err(PipetreeError::NotExtendable(self.node.name.clone())),
        }
    }
}

impl Deref for NodeMut<'_> {
    type Target = Container;

    fn deref(&self) -> &Container {
        self.node
    }
}

/// Shape of a subtree: the value type of a leaf or the ordered shapes of a
/// branch's children.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Leaf(String),
    Branch(Vec<(String, Shape)>),
}

impl Shape {
    pub fn get(&self, name: &str) -> Option<&Shape> {
        match self {
            Shape::Branch(children) => children.iter().find(|(n, _)| n == name).map(|(_, s)| s),
            Shape::Leaf(_) => None,
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        if let Shape::Branch(children) = self {
            for (name, shape) in children {
                let indent = "  ".repeat(depth);
                match shape {
                    Shape::Leaf(type_name) => writeln!(f, "{}{}: {}", indent, name, type_name)?,
                    Shape::Branch(_) => {
                        writeln!(f, "{}{}/", indent, name)?;
                        shape.write_tree(f, depth + 1)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl Serialize for Shape {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Shape::Leaf(type_name) => serializer.serialize_str(type_name),
            Shape::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (name, shape) in children {
                    map.serialize_entry(name, shape)?;
                }
                map.end()
            }
        }
    }
}
