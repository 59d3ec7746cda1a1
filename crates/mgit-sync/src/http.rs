//! HTTP transport.
//!
//! Every call is a POST of one framed [`MgitMessage`] to a per-repository
//! endpoint. Only `NetworkError` (connection failures, 5xx, 429) is retried,
//! with bounded exponential backoff. Positive `has` answers are cached, since
//! a remote never loses an object.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use tracing::warn;
use mgit_protocol::{
    endpoints, AuthMethod, MgitCodec, MgitMessage, ObjectPayload, ProtocolError,
    RefUpdateResult, CONTENT_TYPE as MGIT_CONTENT_TYPE,
};
use mgit_types::ObjectId;

use crate::cache::TtlCache;
use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use crate::types::RetryPolicy;

const DEFAULT_HAS_TTL_SECS: i64 = 300;
const DEFAULT_HAS_CACHE_ENTRIES: usize = 100_000;

pub struct HttpTransport {
    client: Client,
    base_url: String,
    repo: String,
    auth: AuthMethod,
    retry: RetryPolicy,
    has_cache: Mutex<TtlCache<ObjectId, ()>>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("repo", &self.repo)
            .field("auth", &self.auth)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpTransport {
    /// Transport for repository `repo` on the server at `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        repo: impl Into<String>,
        auth: AuthMethod,
    ) -> SyncResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SyncError::InvalidRemote(format!(
                "unsupported url scheme: {base_url}"
            )));
        }
        let repo = repo.into();
        if repo.is_empty() || repo.contains('/') {
            return Err(SyncError::InvalidRemote(format!(
                "invalid repository name: {repo:?}"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            repo,
            auth,
            retry: RetryPolicy::default(),
            has_cache: Mutex::new(TtlCache::new(
                chrono::Duration::seconds(DEFAULT_HAS_TTL_SECS),
                DEFAULT_HAS_CACHE_ENTRIES,
            )),
        })
    }

    /// Parse a remote url of the form `http(s)://host[:port]/<repo>`.
    pub fn from_remote_url(url: &str, auth: AuthMethod) -> SyncResult<Self> {
        let trimmed = url.trim_end_matches('/');
        let (base, repo) = trimmed
            .rsplit_once('/')
            .filter(|(base, _)| base.contains("://") && !base.ends_with('/'))
            .ok_or_else(|| SyncError::InvalidRemote(format!("no repository in url {url}")))?;
        Self::new(base, repo, auth)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_has_cache(mut self, ttl: chrono::Duration, max_entries: usize) -> Self {
        self.has_cache = Mutex::new(TtlCache::new(ttl, max_entries));
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn url(&self, endpoint: &str) -> String {
        format!(
            "{}{}",
            self.base_url,
            endpoints::repo_path(&self.repo, endpoint)
        )
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, TtlCache<ObjectId, ()>> {
        // The cache holds no invariants worth failing over.
        self.has_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn call(&self, endpoint: &str, msg: &MgitMessage) -> SyncResult<MgitMessage> {
        let body = MgitCodec::encode(msg)?;
        let mut attempt = 0;
        loop {
            match self.send_once(endpoint, &body).await {
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    warn!(
                        endpoint,
                        attempt,
                        max_retries = self.retry.max_retries,
                        error = %e,
                        "request failed, retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn send_once(&self, endpoint: &str, body: &[u8]) -> SyncResult<MgitMessage> {
        let mut request = self
            .client
            .post(self.url(endpoint))
            .header(CONTENT_TYPE, MGIT_CONTENT_TYPE)
            .body(body.to_vec());
        if let Some(value) = self.auth.header_value() {
            request = request.header(AUTHORIZATION, value);
        }
        let response = request
            .send()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SyncError::NetworkError(e.to_string()))?;

        if status.is_success() {
            return Ok(MgitCodec::decode_body(&bytes)?);
        }
        let reply = MgitCodec::decode_body(&bytes).ok();
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                SyncError::AuthError(describe(status, reply))
            }
            StatusCode::CONFLICT => match reply {
                Some(MgitMessage::RefUpdateResponse {
                    result: RefUpdateResult::Rejected { name, current, .. },
                }) => SyncError::NonFastForward {
                    name,
                    remote: current,
                },
                other => SyncError::RemoteError(describe(status, other)),
            },
            StatusCode::NOT_FOUND => SyncError::NotFound(describe(status, reply)),
            StatusCode::TOO_MANY_REQUESTS => SyncError::NetworkError(describe(status, reply)),
            s if s.is_server_error() => SyncError::NetworkError(describe(status, reply)),
            _ => SyncError::RemoteError(describe(status, reply)),
        })
    }
}

fn describe(status: StatusCode, reply: Option<MgitMessage>) -> String {
    match reply {
        Some(MgitMessage::Error { message, .. }) => format!("{status}: {message}"),
        _ => status.to_string(),
    }
}

fn unexpected(expected: &'static str, msg: MgitMessage) -> SyncError {
    match msg.expect(expected) {
        Err(e) => e.into(),
        Ok(msg) => ProtocolError::UnexpectedMessage {
            expected,
            actual: msg.type_name(),
        }
        .into(),
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn list_refs(&self, prefix: &str) -> SyncResult<Vec<(String, ObjectId)>> {
        let request = MgitMessage::ListRefsRequest {
            prefix: Some(prefix.to_string()),
        };
        match self.call(endpoints::LIST_REFS, &request).await? {
            MgitMessage::ListRefsResponse { refs } => Ok(refs),
            other => Err(unexpected("ListRefsResponse", other)),
        }
    }

    async fn missing_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectId>> {
        let unknown: Vec<ObjectId> = {
            let cache = self.cache();
            ids.iter().filter(|id| !cache.contains(id)).copied().collect()
        };
        if unknown.is_empty() {
            return Ok(Vec::new());
        }
        let request = MgitMessage::HasRequest {
            ids: unknown.clone(),
        };
        let missing = match self.call(endpoints::HAS, &request).await? {
            MgitMessage::HasResponse { missing } => missing,
            other => return Err(unexpected("HasResponse", other)),
        };
        let absent: HashSet<&ObjectId> = missing.iter().collect();
        let mut cache = self.cache();
        for id in unknown.iter().filter(|id| !absent.contains(id)) {
            cache.insert(*id, ());
        }
        Ok(missing)
    }

    async fn fetch_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectPayload>> {
        let request = MgitMessage::FetchRequest { ids: ids.to_vec() };
        match self.call(endpoints::FETCH, &request).await? {
            MgitMessage::ObjectBatch { objects } => Ok(objects),
            other => Err(unexpected("ObjectBatch", other)),
        }
    }

    async fn push_objects(&self, objects: Vec<ObjectPayload>) -> SyncResult<usize> {
        let ids: Vec<ObjectId> = objects.iter().map(|o| o.id).collect();
        let request = MgitMessage::ObjectBatch { objects };
        let stored = match self.call(endpoints::PUSH, &request).await? {
            MgitMessage::PushAck { stored } => stored as usize,
            other => return Err(unexpected("PushAck", other)),
        };
        let mut cache = self.cache();
        for id in ids {
            cache.insert(id, ());
        }
        Ok(stored)
    }

    async fn update_ref(
        &self,
        name: &str,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> SyncResult<()> {
        let request = MgitMessage::RefUpdateRequest {
            name: name.to_string(),
            expected_old,
            new,
        };
        match self.call(endpoints::REF_UPDATE, &request).await {
            Ok(MgitMessage::RefUpdateResponse {
                result: RefUpdateResult::Ok { .. },
            }) => Ok(()),
            Ok(MgitMessage::RefUpdateResponse {
                result: RefUpdateResult::Rejected { name, current, .. },
            }) => Err(SyncError::NonFastForward {
                name,
                remote: current,
            }),
            // A retried update whose first attempt landed sees its own value.
            Err(SyncError::NonFastForward {
                remote: Some(current),
                ..
            }) if current == new => Ok(()),
            Ok(other) => Err(unexpected("RefUpdateResponse", other)),
            Err(e) => Err(e),
        }
    }
}
