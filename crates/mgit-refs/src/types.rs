//! Core reference types.

use mgit_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Summary information about a branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    /// Branch name (without `refs/heads/`).
    pub name: String,
    /// Commit at the branch tip.
    pub tip: ObjectId,
    /// Whether this is the currently checked-out branch (HEAD points here).
    pub is_current: bool,
}

/// The state of HEAD: either symbolic (pointing to a branch) or detached.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Head {
    /// HEAD points to a branch by name.
    Symbolic(String),
    /// HEAD is detached, pointing directly to a commit.
    Detached(ObjectId),
}
