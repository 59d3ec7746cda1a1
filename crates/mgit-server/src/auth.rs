use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::TokenConfig;
use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn anonymous() -> Self { Self { name: "anonymous".into(), is_admin: false } }
    pub fn user(name: impl Into<String>) -> Self { Self { name: name.into(), is_admin: false } }
    pub fn admin(name: impl Into<String>) -> Self { Self { name: name.into(), is_admin: true } }

    pub fn is_anonymous(&self) -> bool {
        *self == Self::anonymous()
    }
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Bearer(String),
    Anonymous,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Read { repo: String },
    Write { repo: String },
    CreateRepo { repo: String },
}

impl Action {
    pub fn repo(&self) -> &str {
        match self {
            Self::Read { repo } | Self::Write { repo } | Self::CreateRepo { repo } => repo,
        }
    }

    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read { .. })
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { repo } => write!(f, "read:{repo}"),
            Self::Write { repo } => write!(f, "write:{repo}"),
            Self::CreateRepo { repo } => write!(f, "create:{repo}"),
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity>;
    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool>;
}

/// Development provider: every caller may do everything.
pub struct AllowAllAuth;

#[async_trait]
impl AuthProvider for AllowAllAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Bearer(token) => {
                let prefix: String = token.chars().take(8).collect();
                Ok(Identity::user(format!("bearer:{prefix}")))
            }
            Credentials::Anonymous => Ok(Identity::anonymous()),
        }
    }

    async fn authorize(&self, _identity: &Identity, _action: &Action) -> ServerResult<bool> {
        Ok(true)
    }
}

/// Static token table from the server config.
///
/// Unknown tokens fail authentication. Anonymous callers may only read,
/// and only when `allow_anonymous_read` is set.
pub struct TokenAuth {
    // token -> grant
    tokens: HashMap<String, TokenConfig>,
    allow_anonymous_read: bool,
}

impl TokenAuth {
    pub fn new(tokens: &[TokenConfig], allow_anonymous_read: bool) -> Self {
        Self {
            tokens: tokens
                .iter()
                .map(|t| (t.token.clone(), t.clone()))
                .collect(),
            allow_anonymous_read,
        }
    }

    fn grant_for(&self, identity: &Identity) -> Option<&TokenConfig> {
        self.tokens.values().find(|t| t.name == identity.name)
    }
}

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn authenticate(&self, credentials: &Credentials) -> ServerResult<Identity> {
        match credentials {
            Credentials::Anonymous => Ok(Identity::anonymous()),
            Credentials::Bearer(token) => {
                let grant = self
                    .tokens
                    .get(token)
                    .ok_or_else(|| ServerError::AuthFailed("unknown token".into()))?;
                if grant.repos.is_empty() && !grant.read_only {
                    Ok(Identity::admin(&grant.name))
                } else {
                    Ok(Identity::user(&grant.name))
                }
            }
        }
    }

    async fn authorize(&self, identity: &Identity, action: &Action) -> ServerResult<bool> {
        if identity.is_anonymous() {
            return Ok(self.allow_anonymous_read && action.is_read());
        }
        if identity.is_admin {
            return Ok(true);
        }
        let Some(grant) = self.grant_for(identity) else {
            return Ok(false);
        };
        let repo_ok = grant.repos.is_empty() || grant.repos.iter().any(|r| r == action.repo());
        Ok(repo_ok && (action.is_read() || !grant.read_only))
    }
}
