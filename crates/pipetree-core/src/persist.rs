//! Persistence: save and restore a container tree as a directory
//!
//! ```text
//! <dest>/
//!   manifest.json      format version, per-file blake3 hashes, root hash
//!   nodes/000000.json  one record per node, pre-order
//! ```
//!
//! A save is staged in a sibling directory and renamed into place once the
//! manifest, which is written last, is on disk. A directory without a
//! verifiable manifest is never accepted by [`load`].

use crate::container::{Container, Payload};
use crate::error::{PipetreeError, Result};
use crate::index::NameIndex;
use crate::value::{Mapping, Value};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const NODES_DIR: &str = "nodes";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    root: String,
    node_count: usize,
    files: Vec<FileEntry>,
    root_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FileEntry {
    file: String,
    hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum NodeKind {
    Leaf,
    Branch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeRecord {
    name: String,
    /// Pre-order index of the parent record, `None` for the root.
    parent: Option<usize>,
    /// Position among the parent's children.
    position: usize,
    kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default)]
    header: Mapping,
    #[serde(default)]
    meta: Mapping,
}

impl Container {
    /// See [`save`].
    pub fn save(&self, dest: impl AsRef<Path>) -> Result<()> {
        save(self, dest)
    }

    /// See [`load`].
    pub fn load(src: impl AsRef<Path>) -> Result<Container> {
        load(src)
    }
}

/// Write `root` and its whole subtree to `dest`, replacing an earlier save
/// at the same location.
pub fn save(root: &Container, dest: impl AsRef<Path>) -> Result<()> {
    let dest = dest.as_ref();
    let records = flatten(root)?;

    let mut files = Vec::with_capacity(records.len());
    let mut encoded = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| PipetreeError::Unserializable {
            node: record.name.clone(),
            reason: e.to_string(),
        })?;
        files.push(FileEntry {
            file: node_file_name(i),
            hash: hash_bytes(&bytes),
        });
        encoded.push(bytes);
    }

    let manifest = Manifest {
        format_version: FORMAT_VERSION,
        root: root.name().to_string(),
        node_count: records.len(),
        root_hash: root_hash(&files),
        files,
    };

    ensure_replaceable(dest)?;
    let staging = staging_dir(dest)?;
    if let Err(e) = write_staged(&staging, &manifest, &encoded) {
        discard(&staging);
        return Err(e);
    }

    if let Err(e) = replace_dir(&staging, dest) {
        discard(&staging);
        return Err(e);
    }

    info!(root = root.name(), nodes = manifest.node_count, path = %dest.display(), "container saved");
    Ok(())
}

/// Rebuild a tree from a directory written by [`save`].
pub fn load(src: impl AsRef<Path>) -> Result<Container> {
    let src = src.as_ref();
    let manifest_bytes = fs::read(src.join(MANIFEST_FILE)).map_err(|e| {
        PipetreeError::corrupt(format!("{}: cannot read manifest: {}", src.display(), e))
    })?;
    let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
        .map_err(|e| PipetreeError::corrupt(format!("invalid manifest: {}", e)))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(PipetreeError::corrupt(format!(
            "unsupported format version {}",
            manifest.format_version
        )));
    }
    if manifest.files.len() != manifest.node_count || manifest.node_count == 0 {
        return Err(PipetreeError::corrupt("node count does not match file list"));
    }
    if root_hash(&manifest.files) != manifest.root_hash {
        return Err(PipetreeError::corrupt("root hash mismatch"));
    }

    let mut records = Vec::with_capacity(manifest.node_count);
    for entry in &manifest.files {
        let path = src.join(NODES_DIR).join(&entry.file);
        let bytes = fs::read(&path)
            .map_err(|e| PipetreeError::corrupt(format!("{}: {}", path.display(), e)))?;
        if hash_bytes(&bytes) != entry.hash {
            return Err(PipetreeError::corrupt(format!("hash mismatch in {}", entry.file)));
        }
        let record: NodeRecord = serde_json::from_slice(&bytes)
            .map_err(|e| PipetreeError::corrupt(format!("{}: {}", entry.file, e)))?;
        records.push(record);
    }

    let root = rebuild(records)?;
    if root.name() != manifest.root {
        return Err(PipetreeError::corrupt("root name does not match manifest"));
    }
    info!(root = root.name(), nodes = manifest.node_count, path = %src.display(), "container loaded");
    Ok(root)
}

fn flatten(root: &Container) -> Result<Vec<NodeRecord>> {
    let mut records = Vec::new();
    flatten_into(root, None, 0, &mut records)?;
    Ok(records)
}

fn flatten_into(
    node: &Container,
    parent: Option<usize>,
    position: usize,
    records: &mut Vec<NodeRecord>,
) -> Result<()> {
    let unserializable = |reason: String| PipetreeError::Unserializable {
        node: node.name().to_string(),
        reason,
    };
    for (key, value) in node.header().iter().chain(node.meta()) {
        if let Some(reason) = value.unserializable_reason() {
            return Err(unserializable(format!("metadata '{}': {}", key, reason)));
        }
    }

    let (kind, payload) = match node.payload() {
        Payload::Leaf(value) => {
            if let Some(reason) = value.unserializable_reason() {
                return Err(unserializable(reason));
            }
            (NodeKind::Leaf, Some(value.clone()))
        }
        Payload::Branch(_) => (NodeKind::Branch, None),
    };

    let index = records.len();
    records.push(NodeRecord {
        name: node.name().to_string(),
        parent,
        position,
        kind,
        payload,
        header: node.header().clone(),
        meta: node.meta().clone(),
    });

    for (i, child) in node.children().iter().enumerate() {
        flatten_into(child, Some(index), i, records)?;
    }
    Ok(())
}

fn rebuild(records: Vec<NodeRecord>) -> Result<Container> {
    let mut children_of: Vec<Vec<usize>> = vec![Vec::new(); records.len()];
    for (i, record) in records.iter().enumerate() {
        match (i, record.parent) {
            (0, None) => {}
            (0, Some(_)) => return Err(PipetreeError::corrupt("first record is not the root")),
            (_, None) => return Err(PipetreeError::corrupt(format!("second root '{}'", record.name))),
            (_, Some(parent)) if parent >= i => {
                return Err(PipetreeError::corrupt(format!("'{}' precedes its parent", record.name)))
            }
            (_, Some(parent)) => {
                if records[parent].kind != NodeKind::Branch {
                    return Err(PipetreeError::corrupt(format!(
                        "'{}' is attached to leaf '{}'",
                        record.name, records[parent].name
                    )));
                }
                if record.position != children_of[parent].len() {
                    return Err(PipetreeError::corrupt(format!(
                        "'{}' is out of order among its siblings",
                        record.name
                    )));
                }
                children_of[parent].push(i);
            }
        }
    }

    let mut slots: Vec<Option<NodeRecord>> = records.into_iter().map(Some).collect();
    let root = build_node(0, &mut slots, &children_of)?;
    NameIndex::build(&root).map_err(|e| PipetreeError::corrupt(e.to_string()))?;
    Ok(root)
}

fn build_node(
    index: usize,
    slots: &mut [Option<NodeRecord>],
    children_of: &[Vec<usize>],
) -> Result<Container> {
    let record = slots[index]
        .take()
        .ok_or_else(|| PipetreeError::corrupt("record visited twice"))?;

    let payload = match (record.kind, record.payload) {
        (NodeKind::Leaf, Some(value)) => Payload::Leaf(value),
        (NodeKind::Leaf, None) => {
            return Err(PipetreeError::corrupt(format!("leaf '{}' has no payload", record.name)))
        }
        (NodeKind::Branch, None) => {
            let mut children = Vec::with_capacity(children_of[index].len());
            for &child in &children_of[index] {
                children.push(build_node(child, slots, children_of)?);
            }
            Payload::Branch(children)
        }
        (NodeKind::Branch, Some(_)) => {
            return Err(PipetreeError::corrupt(format!("branch '{}' carries a payload", record.name)))
        }
    };

    Ok(Container::restore(record.name, payload, record.header, record.meta))
}

/// Refuse to overwrite a non-empty directory that is not an earlier save.
fn ensure_replaceable(dest: &Path) -> Result<()> {
    if !dest.exists() || dest.join(MANIFEST_FILE).is_file() {
        return Ok(());
    }
    let is_empty_dir = dest.is_dir() && fs::read_dir(dest)?.next().is_none();
    if is_empty_dir {
        return Ok(());
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::AlreadyExists,
        format!("{} exists and is not a saved container", dest.display()),
    )
    .into())
}

fn staging_dir(dest: &Path) -> Result<PathBuf> {
    sibling_dir(dest, "staging")
}

/// Hidden, uniquely named directory next to `dest`.
fn sibling_dir(dest: &Path, tag: &str) -> Result<PathBuf> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    let base = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "container".to_string());
    Ok(parent.join(format!(".{}.{}-{}", base, tag, Uuid::new_v4())))
}

/// Move `staging` to `dest`. An existing `dest` is parked in a backup
/// directory first and put back if the move fails, so the earlier save
/// survives until the new one is in place.
fn replace_dir(staging: &Path, dest: &Path) -> Result<()> {
    let backup = if dest.exists() {
        let backup = sibling_dir(dest, "previous")?;
        fs::rename(dest, &backup)?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = fs::rename(staging, dest) {
        if let Some(backup) = &backup {
            if let Err(restore) = fs::rename(backup, dest) {
                warn!(
                    backup = %backup.display(),
                    error = %restore,
                    "failed to restore previous save"
                );
            }
        }
        return Err(e.into());
    }

    if let Some(backup) = backup {
        discard(&backup);
    }
    Ok(())
}

fn write_staged(staging: &Path, manifest: &Manifest, encoded: &[Vec<u8>]) -> Result<()> {
    let nodes_dir = staging.join(NODES_DIR);
    fs::create_dir_all(&nodes_dir)?;
    for (entry, bytes) in manifest.files.iter().zip(encoded) {
        fs::write(nodes_dir.join(&entry.file), bytes)?;
    }
    let manifest_bytes = serde_json::to_vec_pretty(manifest)
        .map_err(|e| PipetreeError::corrupt(format!("manifest encoding: {}", e)))?;
    fs::write(staging.join(MANIFEST_FILE), manifest_bytes)?;
    debug!(path = %staging.display(), "staged container");
    Ok(())
}

fn discard(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        warn!(path = %staging.display(), error = %e, "failed to remove temporary directory");
    }
}

fn node_file_name(index: usize) -> String {
    format!("{:06}.json", index)
}

fn hash_bytes(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data))
}

fn root_hash(files: &[FileEntry]) -> String {
    let mut hasher = blake3::Hasher::new();
    for entry in files {
        hasher.update(entry.file.as_bytes());
        hasher.update(entry.hash.as_bytes());
    }
    format!("blake3:{}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping;

    fn sample() -> Container {
        let mut root = Container::with_metadata(
            "root",
            Vec::<Container>::new(),
            mapping! { "experiment" => "run-7" },
            Mapping::new(),
        )
        .unwrap();
        root.add_with_metadata(
            "samples",
            Value::from(vec![1.5, 2.5, 3.5]),
            Mapping::new(),
            mapping! { "labels" => vec!["a", "b", "c"], "unit" => "mV" },
        )
        .unwrap();
        root.attach(Container::branch("group")).unwrap();
        root.add_under("group", "blob", Value::Bytes(vec![0, 1, 255])).unwrap();
        root.add_under("group", "empty", Vec::<Container>::new()).unwrap();
        root
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        let original = sample();

        original.save(&dest).unwrap();
        let restored = Container::load(&dest).unwrap();

        assert_eq!(restored.list_names(), original.list_names());
        assert_eq!(restored.describe(), original.describe());
        assert_eq!(restored, original);
    }

    #[test]
    fn test_save_replaces_previous_save() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        sample().save(&dest).unwrap();

        let small = Container::leaf("only", 42);
        small.save(&dest).unwrap();
        assert_eq!(Container::load(&dest).unwrap(), small);

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_unserializable_payload_names_node() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        let mut root = sample();
        root.add_under("group", "handle", Value::opaque(std::time::Instant::now()))
            .unwrap();

        match root.save(&dest).unwrap_err() {
            PipetreeError::Unserializable { node, .. } => assert_eq!(node, "handle"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!dest.exists());
        assert!(load(&dest).is_err());
    }

    #[test]
    fn test_unserializable_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut root = Container::branch("root");
        root.header_mut().insert("clock".into(), Value::opaque(()));
        assert!(matches!(
            root.save(dir.path().join("x")).unwrap_err(),
            PipetreeError::Unserializable { ref node, .. } if node == "root"
        ));
    }

    #[test]
    fn test_missing_source_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load(dir.path().join("nothing")).unwrap_err(),
            PipetreeError::CorruptContainer(_)
        ));
    }

    #[test]
    fn test_tampered_node_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        sample().save(&dest).unwrap();

        fs::write(dest.join(NODES_DIR).join(node_file_name(1)), b"{}").unwrap();
        assert!(matches!(load(&dest).unwrap_err(), PipetreeError::CorruptContainer(_)));
    }

    #[test]
    fn test_missing_node_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        sample().save(&dest).unwrap();

        fs::remove_file(dest.join(NODES_DIR).join(node_file_name(2))).unwrap();
        assert!(matches!(load(&dest).unwrap_err(), PipetreeError::CorruptContainer(_)));
    }

    #[test]
    fn test_refuses_to_clobber_foreign_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("docs");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("notes.txt"), b"keep me").unwrap();

        assert!(matches!(sample().save(&dest).unwrap_err(), PipetreeError::Io(_)));
        assert!(dest.join("notes.txt").exists());
    }

    #[test]
    fn test_rebuild_rejects_orphan_order() {
        let records = vec![
            NodeRecord {
                name: "root".into(),
                parent: None,
                position: 0,
                kind: NodeKind::Branch,
                payload: None,
                header: Mapping::new(),
                meta: Mapping::new(),
            },
            NodeRecord {
                name: "child".into(),
                parent: Some(0),
                position: 3,
                kind: NodeKind::Leaf,
                payload: Some(Value::Int(1)),
                header: Mapping::new(),
                meta: Mapping::new(),
            },
        ];
        assert!(matches!(rebuild(records).unwrap_err(), PipetreeError::CorruptContainer(_)));
    }

    #[test]
    fn test_rebuild_rejects_duplicate_names() {
        let record = |name: &str, parent: Option<usize>, position: usize, kind: NodeKind| NodeRecord {
            name: name.into(),
            parent,
            position,
            kind,
            payload: (kind == NodeKind::Leaf).then_some(Value::Null),
            header: Mapping::new(),
            meta: Mapping::new(),
        };
        let records = vec![
            record("root", None, 0, NodeKind::Branch),
            record("a", Some(0), 0, NodeKind::Leaf),
            record("a", Some(0), 1, NodeKind::Leaf),
        ];
        assert!(matches!(rebuild(records).unwrap_err(), PipetreeError::CorruptContainer(_)));
    }

    #[test]
    fn test_failed_swap_puts_previous_save_back() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("saved");
        sample().save(&dest).unwrap();

        let missing = dir.path().join("never-staged");
        assert!(replace_dir(&missing, &dest).is_err());
        assert_eq!(load(&dest).unwrap(), sample());

        let leftovers = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .count();
        assert_eq!(leftovers, 0);
    }
}
