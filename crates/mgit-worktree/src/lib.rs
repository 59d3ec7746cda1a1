//! Working-tree synchronization for MGit.
//!
//! Tracks the working directory against the index (the snapshot the next
//! commit will record), detects changes by content hash, and materializes
//! committed trees back onto disk.
//!
//! # Key Types
//!
//! - [`WorkTree`] -- filesystem operations: stage, unstage, remove, checkout, status
//! - [`Index`] -- the staging area (BTreeMap-backed, persisted as JSON)
//! - [`IndexEntry`] -- a tracked file
//! - [`WorkdirStatus`] -- result of status computation
//! - [`FileStatus`] -- kind of change (New, Modified, Deleted)

pub mod entry;
pub mod error;
pub mod index;
pub mod status;
pub mod worktree;

pub use entry::IndexEntry;
pub use error::{WorktreeError, WorktreeResult};
pub use index::Index;
pub use status::{FileStatus, StatusEntry, WorkdirStatus};
pub use worktree::{WorkTree, IGNORE_FILE, MGIT_DIR};
