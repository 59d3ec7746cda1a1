//! Error types for the commit graph.

use mgit_crypto::SignatureError;
use mgit_refs::RefError;
use mgit_store::StoreError;
use mgit_types::ObjectId;

/// Errors that can occur during graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Object store failure (includes `NotFound` and `IntegrityError`).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Ref store failure.
    #[error(transparent)]
    Refs(#[from] RefError),

    /// Signing failed; the commit was discarded.
    #[error("signing failed: {0}")]
    Signature(#[from] SignatureError),

    /// The staged entry kind cannot be represented in a tree.
    #[error("unsupported entry {path}: {reason}")]
    UnsupportedEntry { path: String, reason: String },

    /// A path is used both as a file and as a directory, or twice.
    #[error("path conflict at {0}")]
    PathConflict(String),

    /// A staged path is not a valid relative slash-separated path.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// The supplied parents do not match the branch tip.
    #[error("diverged parent on {branch}: tip is {}, first parent is {}", fmt_opt(.tip), fmt_opt(.first_parent))]
    DivergedParent {
        branch: String,
        tip: Option<ObjectId>,
        first_parent: Option<ObjectId>,
    },
}

fn fmt_opt(id: &Option<ObjectId>) -> String {
    id.map(|id| id.short_hex())
        .unwrap_or_else(|| "<none>".to_string())
}

impl GraphError {
    /// Returns `true` if the error means stored data failed verification.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::Store(
                StoreError::IntegrityError { .. }
                    | StoreError::CorruptObject { .. }
                    | StoreError::UnexpectedKind { .. }
            )
        )
    }
}

/// Convenience alias for graph results.
pub type GraphResult<T> = Result<T, GraphError>;
