//! Error types for reference operations.

use mgit_types::ObjectId;
use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// The ref name is invalid.
    #[error("invalid ref name: {name}: {reason}")]
    InvalidRefName { name: String, reason: String },

    /// A compare-and-swap found a different value than expected.
    #[error("ref {name} moved: expected {}, found {}", fmt_opt(.expected), fmt_opt(.actual))]
    CasFailed {
        name: String,
        expected: Option<ObjectId>,
        actual: Option<ObjectId>,
    },

    /// HEAD is in a detached state (not pointing to a branch).
    #[error("HEAD is detached")]
    DetachedHead,

    /// Cannot delete the currently checked-out branch.
    #[error("cannot delete current branch: {name}")]
    DeleteCurrentBranch { name: String },

    /// A ref file did not contain a valid commit id.
    #[error("corrupt ref {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_opt(id: &Option<ObjectId>) -> String {
    id.map(|id| id.short_hex())
        .unwrap_or_else(|| "<none>".to_string())
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
