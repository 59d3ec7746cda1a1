//! Building nested trees from flat staged paths, and flattening them back.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use mgit_store::{validate_entry_name, EntryMode, ObjectStore, Tree, TreeEntry};
use mgit_types::ObjectId;

use crate::error::{GraphError, GraphResult};

/// Kind of a staged working-tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Executable,
    Symlink,
    Submodule,
}

impl EntryKind {
    fn mode(self) -> Option<EntryMode> {
        match self {
            Self::File => Some(EntryMode::Regular),
            Self::Executable => Some(EntryMode::Executable),
            Self::Symlink | Self::Submodule => None,
        }
    }
}

/// A staged file: slash-separated path plus the blob holding its content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedEntry {
    pub path: String,
    pub blob: ObjectId,
    pub kind: EntryKind,
}

impl StagedEntry {
    pub fn file(path: impl Into<String>, blob: ObjectId) -> Self {
        Self {
            path: path.into(),
            blob,
            kind: EntryKind::File,
        }
    }
}

/// A file reachable from a tree, as yielded by [`read_tree_recursive`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedFile {
    pub blob: ObjectId,
    pub mode: EntryMode,
}

enum Node {
    File(EntryMode, ObjectId),
    Dir(BTreeMap<String, Node>),
}

/// Split and validate a relative path.
pub(crate) fn path_segments(path: &str) -> GraphResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    for segment in &segments {
        validate_entry_name(segment).map_err(|_| GraphError::InvalidPath {
            path: path.to_string(),
            reason: format!("bad segment {segment:?}"),
        })?;
    }
    Ok(segments)
}

fn insert(root: &mut BTreeMap<String, Node>, entry: &StagedEntry) -> GraphResult<()> {
    let mode = entry.kind.mode().ok_or_else(|| GraphError::UnsupportedEntry {
        path: entry.path.clone(),
        reason: format!("{:?} entries cannot be committed", entry.kind),
    })?;
    let segments = path_segments(&entry.path)?;
    let (leaf, dirs) = segments
        .split_last()
        .ok_or_else(|| GraphError::InvalidPath {
            path: entry.path.clone(),
            reason: "empty path".into(),
        })?;

    let mut current = root;
    for dir in dirs {
        let node = current
            .entry((*dir).to_string())
            .or_insert_with(|| Node::Dir(BTreeMap::new()));
        current = match node {
            Node::Dir(children) => children,
            Node::File(..) => return Err(GraphError::PathConflict(entry.path.clone())),
        };
    }
    if current.contains_key(*leaf) {
        return Err(GraphError::PathConflict(entry.path.clone()));
    }
    current.insert((*leaf).to_string(), Node::File(mode, entry.blob));
    Ok(())
}

fn write_dir(store: &dyn ObjectStore, children: &BTreeMap<String, Node>) -> GraphResult<ObjectId> {
    let mut entries = Vec::with_capacity(children.len());
    for (name, node) in children {
        let entry = match node {
            Node::File(mode, id) => TreeEntry::new(*mode, name.clone(), *id),
            Node::Dir(sub) => {
                TreeEntry::new(EntryMode::Directory, name.clone(), write_dir(store, sub)?)
            }
        };
        entries.push(entry);
    }
    Ok(store.put_tree(&Tree::new(entries))?)
}

/// Build nested tree objects from staged entries and return the root id.
///
/// Subtrees are written bottom-up. The blobs must already be in the store;
/// an empty entry list yields the empty tree.
pub fn build_tree(store: &dyn ObjectStore, entries: &[StagedEntry]) -> GraphResult<ObjectId> {
    let mut root = BTreeMap::new();
    for entry in entries {
        insert(&mut root, entry)?;
    }
    let id = write_dir(store, &root)?;
    tracing::debug!(tree = %id, entries = entries.len(), "built tree");
    Ok(id)
}

/// Every file reachable from a tree, keyed by slash-separated path.
pub fn read_tree_recursive(
    store: &dyn ObjectStore,
    tree: &ObjectId,
) -> GraphResult<BTreeMap<String, TrackedFile>> {
    let mut out = BTreeMap::new();
    let mut pending = vec![(String::new(), *tree)];
    while let Some((prefix, id)) = pending.pop() {
        for entry in store.get_tree(&id)?.entries {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode == EntryMode::Directory {
                pending.push((path, entry.object_id));
            } else {
                out.insert(
                    path,
                    TrackedFile {
                        blob: entry.object_id,
                        mode: entry.mode,
                    },
                );
            }
        }
    }
    Ok(out)
}
