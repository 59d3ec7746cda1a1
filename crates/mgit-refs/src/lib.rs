//! Reference management for MGit.
//!
//! This crate provides named references (branches, remote-tracking refs,
//! HEAD) that point to commit ids. References are the mutable entry points
//! into the immutable commit graph, analogous to git refs.
//!
//! # Architecture
//!
//! - **Branches** (`refs/heads/*`) are mutable pointers to commit chain tips.
//!   They only advance through [`RefStore::compare_and_swap`], so two writers
//!   racing on the same branch cannot silently overwrite each other.
//! - **Remote refs** (`refs/remotes/{remote}/*`) record the last known tip of
//!   a branch on a remote and are only updated by sync operations.
//! - **HEAD** is a symbolic ref naming the current branch, or a detached
//!   ref pointing directly to a commit.
//!
//! # Modules
//!
//! - [`error`] -- Error types for ref operations
//! - [`types`] -- Core ref types: [`Head`], [`BranchInfo`]
//! - [`traits`] -- The [`RefStore`] trait defining the storage interface
//! - [`names`] -- Ref name construction and validation
//! - [`memory`] -- In-memory [`InMemoryRefStore`] for tests
//! - [`fs`] -- [`FsRefStore`], git-style loose ref files

pub mod error;
pub mod fs;
pub mod memory;
pub mod names;
pub mod traits;
pub mod types;

pub use error::{RefError, Result};
pub use fs::FsRefStore;
pub use memory::InMemoryRefStore;
pub use names::{
    branch_ref, remote_ref, validate_branch_name, validate_ref_name, validate_remote_name,
    RefName,
};
pub use traits::RefStore;
pub use types::{BranchInfo, Head};
