//! Error types for the worktree crate.

use std::path::PathBuf;

/// Errors that can occur during working-tree operations.
#[derive(Debug, thiserror::Error)]
pub enum WorktreeError {
    /// The path is not tracked by the index.
    #[error("path not tracked: {0}")]
    NotTracked(String),

    /// The path resolves outside the working tree (or into `.mgit`).
    #[error("path outside working tree: {}", .0.display())]
    OutsideWorktree(PathBuf),

    /// The path does not exist on disk.
    #[error("no such file: {}", .0.display())]
    NoSuchFile(PathBuf),

    /// Not a regular file (symlink, socket, device).
    #[error("unsupported entry {path}: {reason}")]
    UnsupportedEntry { path: String, reason: String },

    /// Uncommitted work would be lost by the operation.
    #[error("working tree has uncommitted changes: {}", .0.join(", "))]
    DirtyWorkingTree(Vec<String>),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] mgit_store::StoreError),

    /// Tree building or reading failed.
    #[error("graph error: {0}")]
    Graph(#[from] mgit_graph::GraphError),

    /// Index (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Directory walk failed.
    #[error("walk error: {0}")]
    Walk(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias for worktree results.
pub type WorktreeResult<T> = Result<T, WorktreeError>;
