//! Working directory status types.
//!
//! These types represent the result of comparing the working directory,
//! the index, and the last committed tree.

use serde::{Deserialize, Serialize};

/// Complete status of the working directory relative to the index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkdirStatus {
    /// Index changes relative to the last commit.
    pub staged: Vec<StatusEntry>,
    /// Tracked files whose content differs from the index.
    pub modified: Vec<String>,
    /// Tracked files missing from disk.
    pub deleted: Vec<String>,
    /// Files present in the working directory but not tracked.
    pub untracked: Vec<String>,
}

impl WorkdirStatus {
    /// Create an empty status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if there are no changes of any kind.
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty()
            && self.modified.is_empty()
            && self.untracked.is_empty()
            && self.deleted.is_empty()
    }

    /// Returns `true` if there are any staged changes.
    pub fn has_staged_changes(&self) -> bool {
        !self.staged.is_empty()
    }

    /// Paths with work that a checkout would discard. Untracked files are
    /// not included.
    pub fn dirty_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .staged
            .iter()
            .map(|e| e.path.clone())
            .chain(self.modified.iter().cloned())
            .chain(self.deleted.iter().cloned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Total number of entries across all categories.
    pub fn total_entries(&self) -> usize {
        self.staged.len() + self.modified.len() + self.untracked.len() + self.deleted.len()
    }
}

/// A single staged change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    /// The file path relative to the workdir root.
    pub path: String,
    /// The kind of change.
    pub status: FileStatus,
}

impl StatusEntry {
    /// Create a new status entry.
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// The kind of file change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    /// A new file that did not previously exist.
    New,
    /// An existing file whose content has changed.
    Modified,
    /// A file that has been removed.
    Deleted,
}
