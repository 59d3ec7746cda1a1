//! High-level SDK for MGit repositories.
//!
//! [`Repository`] ties the object store, refs, commit graph, working tree
//! and sync engine together behind one handle. This is the entry point for
//! applications embedding MGit and for the `mgit` command line.

pub mod commit;
pub mod config;
pub mod error;
pub mod repository;

pub use commit::{CommitResult, CommitSummary};
pub use config::{RemoteConfig, RepoConfig, SyncConfig, UserConfig};
pub use error::{SdkError, SdkResult};
pub use repository::{Repository, DEFAULT_BRANCH};

// Re-export key types
pub use mgit_crypto::{NostrEvent, SigningKey};
pub use mgit_graph::{ChainReport, LocalIdentity, SigningIdentity, StagedEntry};
pub use mgit_refs::{BranchInfo, RefError};
pub use mgit_store::SignatureStatus;
pub use mgit_sync::{
    HostedRepository, LocalTransport, MergeStatus, PullResult, PushResult, RemoteTransport,
    SyncState,
};
pub use mgit_types::{NostrPubkey, ObjectId};
pub use mgit_worktree::{FileStatus, StatusEntry, WorkdirStatus};
