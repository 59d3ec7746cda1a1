use serde::{Deserialize, Serialize};

/// Content type of framed protocol bodies.
pub const CONTENT_TYPE: &str = "application/x-mgit";

/// HTTP endpoint paths for the MGit protocol.
pub mod endpoints {
    pub const HEALTH: &str = "/v1/health";
    pub const INFO: &str = "/v1/info";
    pub const REPOS: &str = "/v1/repos";

    // Relative to `/v1/repos/{repo}`.
    pub const LIST_REFS: &str = "/refs";
    pub const HAS: &str = "/objects/has";
    pub const FETCH: &str = "/objects/fetch";
    pub const PUSH: &str = "/objects/push";
    pub const REF_UPDATE: &str = "/refs/update";

    /// Full path of a per-repository endpoint.
    pub fn repo_path(repo: &str, endpoint: &str) -> String {
        format!("{REPOS}/{repo}{endpoint}")
    }
}

/// Health check response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::message::PROTOCOL_VERSION,
        }
    }
}

/// Server description returned by `GET /v1/info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub protocol_version: u32,
    pub capabilities: Vec<String>,
    pub repositories: Vec<String>,
    pub anonymous_read: bool,
}
