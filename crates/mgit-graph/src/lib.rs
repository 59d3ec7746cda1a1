//! Commit graph management for MGit.
//!
//! Builds trees from staged entries, creates Nostr-signed commits, advances
//! branch refs by compare-and-swap, and walks history: first-parent logs,
//! ancestry checks, and full signature verification of a commit's past.
//!
//! Signing is a capability: the graph is handed a [`SigningIdentity`] for
//! each commit and never sees or stores private key material beyond the
//! duration of a single signature.

pub mod draft;
pub mod error;
pub mod graph;
pub mod identity;
pub mod tree;

pub use draft::{PersistedCommit, SignedCommit, StagedCommit};
pub use error::{GraphError, GraphResult};
pub use graph::{ChainReport, CommitGraph, Log};
pub use identity::{KeyProvider, LocalIdentity, ProviderIdentity, SigningIdentity};
pub use tree::{build_tree, read_tree_recursive, EntryKind, StagedEntry, TrackedFile};
