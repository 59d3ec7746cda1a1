use mgit_types::ObjectId;

use crate::object::ObjectKind;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// Stored bytes no longer hash to their key. Never repaired.
    #[error("integrity error: {id} hashes to {computed}")]
    IntegrityError { id: ObjectId, computed: ObjectId },

    /// Bytes are not a well-formed framed object.
    #[error("malformed object: {0}")]
    Malformed(String),

    /// A stored object could not be decoded.
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// The object exists but is of a different kind.
    #[error("object {id} is a {actual}, expected a {expected}")]
    UnexpectedKind {
        id: ObjectId,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    /// A tree entry name is not a valid single path segment.
    #[error("invalid tree entry: {0}")]
    InvalidTreeEntry(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Attach the object id to a decode failure.
    pub(crate) fn for_object(self, id: &ObjectId) -> Self {
        match self {
            Self::Malformed(reason) => Self::CorruptObject { id: *id, reason },
            Self::UnexpectedKind {
                expected, actual, ..
            } => Self::UnexpectedKind {
                id: *id,
                expected,
                actual,
            },
            other => other,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
