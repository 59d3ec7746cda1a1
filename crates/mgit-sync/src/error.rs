use mgit_types::ObjectId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote refused the credentials (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// The remote ref moved, or the update would discard remote commits.
    #[error("non-fast-forward update of {name} (remote at {remote:?})")]
    NonFastForward {
        name: String,
        remote: Option<ObjectId>,
    },

    /// Local and remote histories diverged; merging is left to the caller.
    #[error("branch {branch} diverged from remote: local {local}, remote {remote}")]
    MergeRequired {
        branch: String,
        local: ObjectId,
        remote: ObjectId,
    },

    /// Transient transport failure. The only retryable error.
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("remote error: {0}")]
    RemoteError(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A received object's bytes do not hash to its claimed id.
    #[error("integrity error: object claimed {claimed}, bytes hash to {actual}")]
    IntegrityError { claimed: ObjectId, actual: ObjectId },

    /// Fetched history contains an unsigned or badly signed commit.
    #[error("chain verification failed at commit {commit}")]
    VerificationFailed { commit: ObjectId },

    #[error("invalid remote: {0}")]
    InvalidRemote(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] mgit_protocol::ProtocolError),

    #[error("store error: {0}")]
    Store(#[from] mgit_store::StoreError),

    #[error("ref error: {0}")]
    Refs(#[from] mgit_refs::RefError),

    #[error("graph error: {0}")]
    Graph(#[from] mgit_graph::GraphError),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
