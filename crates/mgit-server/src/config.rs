use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use mgit_protocol::MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Server configuration, usually read from a TOML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Directory holding one subdirectory per repository. `None` keeps
    /// every repository in memory.
    pub repos_root: Option<PathBuf>,
    /// Create a repository on its first authorized write.
    pub auto_create: bool,
    pub allow_anonymous_read: bool,
    pub max_body_bytes: usize,
    pub tokens: Vec<TokenConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7070)),
            repos_root: None,
            auto_create: true,
            allow_anonymous_read: false,
            max_body_bytes: MAX_MESSAGE_SIZE,
            tokens: Vec::new(),
        }
    }
}

/// One bearer token and what it may touch.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub name: String,
    pub token: String,
    /// Repositories this token may access; empty means all of them.
    #[serde(default)]
    pub repos: Vec<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("name", &self.name)
            .field("repos", &self.repos)
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    fn validate(&self) -> ServerResult<()> {
        if self.max_body_bytes == 0 {
            return Err(ServerError::Config("max_body_bytes must be positive".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for t in &self.tokens {
            if t.token.trim().is_empty() {
                return Err(ServerError::Config(format!("token for {} is empty", t.name)));
            }
            if !seen.insert(t.token.as_str()) {
                return Err(ServerError::Config(format!(
                    "token for {} is configured twice",
                    t.name
                )));
            }
        }
        Ok(())
    }
}
