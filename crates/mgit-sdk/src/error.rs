use std::path::PathBuf;

use mgit_types::{NostrPubkey, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("not an mgit repository: {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("repository already exists at {}", .0.display())]
    AlreadyInitialized(PathBuf),

    /// The repository has no working tree (see `Repository::in_memory`).
    #[error("operation needs a working tree")]
    NoWorkingTree,

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("not a branch or commit: {0}")]
    UnknownRevision(String),

    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    #[error("remote already exists: {0}")]
    RemoteExists(String),

    #[error("nothing to commit")]
    NothingToCommit,

    #[error("signing key {actual} does not match configured user {expected}")]
    IdentityMismatch {
        expected: NostrPubkey,
        actual: NostrPubkey,
    },

    #[error("commit {0} is not validly signed")]
    InvalidHistory(ObjectId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] mgit_store::StoreError),

    #[error(transparent)]
    Refs(#[from] mgit_refs::RefError),

    #[error(transparent)]
    Graph(#[from] mgit_graph::GraphError),

    #[error(transparent)]
    Worktree(#[from] mgit_worktree::WorktreeError),

    #[error(transparent)]
    Sync(#[from] mgit_sync::SyncError),

    #[error(transparent)]
    Signature(#[from] mgit_crypto::SignatureError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
