use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use mgit_graph::GraphError;
use mgit_protocol::{MgitCodec, MgitMessage, ProtocolError, CONTENT_TYPE};
use mgit_refs::RefError;
use mgit_store::StoreError;
use mgit_sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("invalid repository name: {0:?}")]
    InvalidRepoName(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("authorization denied: {action} for {identity}")]
    AuthorizationDenied { identity: String, action: String },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{0}")]
    Sync(#[from] SyncError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ref error: {0}")]
    Refs(#[from] RefError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RepoNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRepoName(_) | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            Self::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            Self::Sync(e) => sync_status(e),
            Self::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            Self::Refs(RefError::InvalidRefName { .. }) => StatusCode::BAD_REQUEST,
            Self::Store(_)
            | Self::Refs(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn sync_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotFound(_) | SyncError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        SyncError::Graph(GraphError::Store(StoreError::NotFound(_))) => StatusCode::NOT_FOUND,
        SyncError::IntegrityError { .. }
        | SyncError::Store(StoreError::Malformed(_))
        | SyncError::Graph(GraphError::Store(StoreError::UnexpectedKind { .. })) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SyncError::Refs(RefError::InvalidRefName { .. }) | SyncError::Protocol(_) => {
            StatusCode::BAD_REQUEST
        }
        SyncError::NonFastForward { .. } => StatusCode::CONFLICT,
        SyncError::AuthError(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
            "an internal error occurred".to_string()
        } else {
            tracing::debug!(error = %self, %status, "request failed");
            self.to_string()
        };
        let reply = MgitMessage::Error {
            code: u32::from(status.as_u16()),
            message,
        };
        match MgitCodec::encode(&reply) {
            Ok(body) => (status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
            Err(_) => status.into_response(),
        }
    }
}
