//! Index entry types for tracking working directory files.

use serde::{Deserialize, Serialize};
use mgit_graph::{EntryKind, StagedEntry};
use mgit_store::EntryMode;
use mgit_types::ObjectId;

/// An entry in the staging index, representing a tracked file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Relative slash-separated path from the workdir root.
    pub path: String,
    /// Content-addressed ID of the file's blob in the object store.
    pub object_id: ObjectId,
    /// File mode (regular or executable).
    pub mode: EntryMode,
    /// File size in bytes at staging time.
    pub size: u64,
}

impl IndexEntry {
    /// Create a new index entry.
    pub fn new(path: impl Into<String>, object_id: ObjectId, mode: EntryMode, size: u64) -> Self {
        Self {
            path: path.into(),
            object_id,
            mode,
            size,
        }
    }

    /// The entry as input for tree building.
    pub fn to_staged(&self) -> StagedEntry {
        let kind = match self.mode {
            EntryMode::Executable => EntryKind::Executable,
            _ => EntryKind::File,
        };
        StagedEntry {
            path: self.path.clone(),
            blob: self.object_id,
            kind,
        }
    }
}
