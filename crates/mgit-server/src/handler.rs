//! Request handlers.
//!
//! Repository endpoints take one framed [`MgitMessage`] and answer with one.
//! Authentication runs before the body is decoded.

use std::collections::HashSet;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use mgit_protocol::{
    capabilities, AuthMethod, HealthResponse, MgitCodec, MgitMessage, ProtocolError,
    RefUpdateResult, ServerInfo, CONTENT_TYPE, PROTOCOL_VERSION,
};
use mgit_sync::HostedRepository;
use tracing::{debug, info};

use crate::auth::{Action, Credentials, Identity};
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

pub async fn info_handler(State(state): State<AppState>) -> ServerResult<Json<ServerInfo>> {
    Ok(Json(ServerInfo {
        protocol_version: PROTOCOL_VERSION,
        capabilities: capabilities::all(),
        repositories: state.registry.names()?,
        anonymous_read: state.config.allow_anonymous_read,
    }))
}

pub async fn list_refs_handler(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    authorize(&state, &headers, Action::Read { repo: repo.clone() }).await?;
    let prefix = match decode(&body)? {
        MgitMessage::ListRefsRequest { prefix } => prefix,
        other => return Err(unexpected("ListRefsRequest", &other)),
    };
    let refs = match readable(&state, &repo)? {
        Some(hosted) => hosted.list_refs(prefix.as_deref().unwrap_or("refs/"))?,
        None => Vec::new(),
    };
    reply(StatusCode::OK, &MgitMessage::ListRefsResponse { refs })
}

pub async fn has_handler(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    authorize(&state, &headers, Action::Read { repo: repo.clone() }).await?;
    let ids = match decode(&body)? {
        MgitMessage::HasRequest { ids } => ids,
        other => return Err(unexpected("HasRequest", &other)),
    };
    let missing = match readable(&state, &repo)? {
        Some(hosted) => hosted.missing(&ids),
        None => {
            let mut seen = HashSet::new();
            ids.into_iter().filter(|id| seen.insert(*id)).collect()
        }
    };
    reply(StatusCode::OK, &MgitMessage::HasResponse { missing })
}

pub async fn fetch_handler(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    authorize(&state, &headers, Action::Read { repo: repo.clone() }).await?;
    let ids = match decode(&body)? {
        MgitMessage::FetchRequest { ids } => ids,
        other => return Err(unexpected("FetchRequest", &other)),
    };
    let hosted = state
        .registry
        .get(&repo)?
        .ok_or(ServerError::RepoNotFound(repo))?;
    let objects = blocking(move || Ok(hosted.fetch(&ids)?)).await?;
    debug!(count = objects.len(), "serving objects");
    reply(StatusCode::OK, &MgitMessage::ObjectBatch { objects })
}

pub async fn push_handler(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let identity = authorize(&state, &headers, Action::Write { repo: repo.clone() }).await?;
    let objects = match decode(&body)? {
        MgitMessage::ObjectBatch { objects } => objects,
        other => return Err(unexpected("ObjectBatch", &other)),
    };
    let hosted = writable(&state, &identity, &repo).await?;
    let received = objects.len();
    let stored = blocking(move || Ok(hosted.receive(&objects)?)).await?;
    info!(repo = %repo, user = %identity.name, received, stored, "objects pushed");
    reply(
        StatusCode::OK,
        &MgitMessage::PushAck {
            stored: u32::try_from(stored).unwrap_or(u32::MAX),
        },
    )
}

pub async fn ref_update_handler(
    State(state): State<AppState>,
    Path(repo): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ServerResult<Response> {
    let identity = authorize(&state, &headers, Action::Write { repo: repo.clone() }).await?;
    let (name, expected_old, new) = match decode(&body)? {
        MgitMessage::RefUpdateRequest {
            name,
            expected_old,
            new,
        } => (name, expected_old, new),
        other => return Err(unexpected("RefUpdateRequest", &other)),
    };
    let hosted = writable(&state, &identity, &repo).await?;
    let result = blocking(move || Ok(hosted.update_ref(&name, expected_old, new)?)).await?;
    let status = match &result {
        RefUpdateResult::Ok { name } => {
            info!(repo = %repo, user = %identity.name, name = %name, to = %new.short_hex(), "ref advanced");
            StatusCode::OK
        }
        RefUpdateResult::Rejected { .. } => StatusCode::CONFLICT,
    };
    reply(status, &MgitMessage::RefUpdateResponse { result })
}

/// Authenticate the caller and check `action`.
///
/// Anonymous callers that are refused get 401 so clients know to send a
/// token. Authenticated callers that are refused get 403.
async fn authorize(state: &AppState, headers: &HeaderMap, action: Action) -> ServerResult<Identity> {
    let credentials = credentials(headers)?;
    let identity = state.auth.authenticate(&credentials).await?;
    if state.auth.authorize(&identity, &action).await? {
        return Ok(identity);
    }
    if identity.is_anonymous() {
        Err(ServerError::AuthFailed(format!("{action} requires a token")))
    } else {
        Err(ServerError::AuthorizationDenied {
            identity: identity.name,
            action: action.to_string(),
        })
    }
}

fn credentials(headers: &HeaderMap) -> ServerResult<Credentials> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Credentials::Anonymous);
    };
    let value = value
        .to_str()
        .map_err(|_| ServerError::AuthFailed("malformed authorization header".into()))?;
    AuthMethod::parse_header(value)
        .map(|token| Credentials::Bearer(token.to_string()))
        .ok_or_else(|| ServerError::AuthFailed("expected a bearer token".into()))
}

/// A repository for reading. A missing repository reads as empty while
/// writes may still create it.
fn readable(state: &AppState, repo: &str) -> ServerResult<Option<Arc<HostedRepository>>> {
    match state.registry.get(repo)? {
        Some(hosted) => Ok(Some(hosted)),
        None if state.config.auto_create => Ok(None),
        None => Err(ServerError::RepoNotFound(repo.to_string())),
    }
}

async fn writable(
    state: &AppState,
    identity: &Identity,
    repo: &str,
) -> ServerResult<Arc<HostedRepository>> {
    if let Some(hosted) = state.registry.get(repo)? {
        return Ok(hosted);
    }
    if !state.config.auto_create {
        return Err(ServerError::RepoNotFound(repo.to_string()));
    }
    let action = Action::CreateRepo {
        repo: repo.to_string(),
    };
    if !state.auth.authorize(identity, &action).await? {
        return Err(ServerError::AuthorizationDenied {
            identity: identity.name.clone(),
            action: action.to_string(),
        });
    }
    state.registry.open_or_create(repo)
}

fn decode(body: &[u8]) -> ServerResult<MgitMessage> {
    Ok(MgitCodec::decode_body(body)?)
}

fn unexpected(expected: &'static str, actual: &MgitMessage) -> ServerError {
    ProtocolError::UnexpectedMessage {
        expected,
        actual: actual.type_name(),
    }
    .into()
}

/// Run store work off the async runtime.
async fn blocking<T, F>(f: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ServerResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
}

fn reply(status: StatusCode, msg: &MgitMessage) -> ServerResult<Response> {
    let body = MgitCodec::encode(msg)?;
    Ok((status, [(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response())
}
