//! The staging index.
//!
//! The [`Index`] is a `BTreeMap<String, IndexEntry>` holding exactly what
//! the next commit will record, plus the tree it was last synchronized with
//! (`base_tree`). Staged changes are the difference between the two. It is
//! persisted as JSON and always written atomically.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use mgit_graph::{StagedEntry, TrackedFile};
use mgit_store::fs::write_atomic;
use mgit_types::ObjectId;

use crate::entry::IndexEntry;
use crate::error::{WorktreeError, WorktreeResult};
use crate::status::{FileStatus, StatusEntry};

const INDEX_VERSION: u32 = 1;

/// The staging index: tracks which files make up the next commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// The index format version.
    pub version: u32,
    /// Tree of the commit the index was last reset to or committed as.
    pub base_tree: Option<ObjectId>,
    /// All tracked entries, keyed by path.
    pub entries: BTreeMap<String, IndexEntry>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            base_tree: None,
            entries: BTreeMap::new(),
        }
    }

    /// Load from `path`; a missing file yields an empty index.
    pub fn load(path: &Path) -> WorktreeResult<Self> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let index: Self = serde_json::from_slice(&bytes)
            .map_err(|e| WorktreeError::Serialization(e.to_string()))?;
        if index.version != INDEX_VERSION {
            return Err(WorktreeError::Serialization(format!(
                "unsupported index version {}",
                index.version
            )));
        }
        Ok(index)
    }

    /// Persist to `path` atomically.
    pub fn save(&self, path: &Path) -> WorktreeResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| WorktreeError::Serialization(e.to_string()))?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Build an index mirroring a tree's files.
    pub fn from_tree(tree: ObjectId, files: &BTreeMap<String, TrackedFile>, sizes: &BTreeMap<String, u64>) -> Self {
        let entries = files
            .iter()
            .map(|(path, file)| {
                let size = sizes.get(path).copied().unwrap_or(0);
                (path.clone(), IndexEntry::new(path.clone(), file.blob, file.mode, size))
            })
            .collect();
        Self {
            version: INDEX_VERSION,
            base_tree: Some(tree),
            entries,
        }
    }

    /// Number of entries in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an entry by path.
    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    /// Remove an entry, failing if it is not tracked.
    pub fn remove(&mut self, path: &str) -> WorktreeResult<IndexEntry> {
        self.entries
            .remove(path)
            .ok_or_else(|| WorktreeError::NotTracked(path.to_string()))
    }

    /// Entries as tree-building input.
    pub fn staged_entries(&self) -> Vec<StagedEntry> {
        self.entries.values().map(IndexEntry::to_staged).collect()
    }

    /// Differences between the index and the files of `base`.
    pub fn changes_against(&self, base: &BTreeMap<String, TrackedFile>) -> Vec<StatusEntry> {
        let mut changes = Vec::new();
        for (path, entry) in &self.entries {
            match base.get(path) {
                None => changes.push(StatusEntry::new(path, FileStatus::New)),
                Some(file) if file.blob != entry.object_id || file.mode != entry.mode => {
                    changes.push(StatusEntry::new(path, FileStatus::Modified))
                }
                Some(_) => {}
            }
        }
        for path in base.keys() {
            if !self.entries.contains_key(path) {
                changes.push(StatusEntry::new(path, FileStatus::Deleted));
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgit_store::EntryMode;
    use tempfile::TempDir;

    fn entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry::new(path, ObjectId::from_bytes(content), EntryMode::Regular, content.len() as u64)
    }

    fn tracked(content: &[u8]) -> TrackedFile {
        TrackedFile {
            blob: ObjectId::from_bytes(content),
            mode: EntryMode::Regular,
        }
    }

    #[test]
    fn insert_get_remove() {
        let mut idx = Index::new();
        idx.insert(entry("a.txt", b"a"));
        assert_eq!(idx.len(), 1);
        assert!(idx.get("a.txt").is_some());
        idx.remove("a.txt").unwrap();
        assert!(idx.is_empty());
        assert!(matches!(idx.remove("a.txt"), Err(WorktreeError::NotTracked(_))));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(".mgit").join("index");
        let mut idx = Index::new();
        idx.base_tree = Some(ObjectId::from_bytes(b"tree"));
        idx.insert(entry("records/a.json", b"[]"));
        idx.save(&path).unwrap();

        let loaded = Index::load(&path).unwrap();
        assert_eq!(loaded, idx);
    }

    #[test]
    fn load_missing_is_empty() {
        let temp = TempDir::new().unwrap();
        let idx = Index::load(&temp.path().join("index")).unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.base_tree, None);
    }

    #[test]
    fn load_rejects_garbage() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            Index::load(&path),
            Err(WorktreeError::Serialization(_))
        ));
    }

    #[test]
    fn changes_against_base() {
        let mut base = BTreeMap::new();
        base.insert("same".to_string(), tracked(b"s"));
        base.insert("changed".to_string(), tracked(b"old"));
        base.insert("gone".to_string(), tracked(b"g"));

        let mut idx = Index::new();
        idx.insert(entry("same", b"s"));
        idx.insert(entry("changed", b"new"));
        idx.insert(entry("added", b"n"));

        let changes = idx.changes_against(&base);
        assert_eq!(
            changes,
            vec![
                StatusEntry::new("added", FileStatus::New),
                StatusEntry::new("changed", FileStatus::Modified),
                StatusEntry::new("gone", FileStatus::Deleted),
            ]
        );
    }

    #[test]
    fn from_tree_mirrors_files() {
        let mut files = BTreeMap::new();
        files.insert("a".to_string(), tracked(b"a"));
        let tree = ObjectId::from_bytes(b"t");
        let idx = Index::from_tree(tree, &files, &BTreeMap::new());
        assert_eq!(idx.base_tree, Some(tree));
        assert!(idx.changes_against(&files).is_empty());
    }
}
