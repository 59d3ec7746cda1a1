use serde::{Deserialize, Serialize};

/// Authentication method for connecting to a remote.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    Bearer(String),
    #[default]
    Anonymous,
}

impl std::fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl AuthMethod {
    /// Bearer auth from an optional token; empty tokens count as none.
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(t) if !t.trim().is_empty() => Self::Bearer(t.trim().to_string()),
            _ => Self::Anonymous,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Self::Anonymous)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Bearer(_) => "bearer-token",
            Self::Anonymous => "anonymous",
        }
    }

    /// Value for the `Authorization` header, if any.
    pub fn header_value(&self) -> Option<String> {
        match self {
            Self::Bearer(token) => Some(format!("Bearer {token}")),
            Self::Anonymous => None,
        }
    }

    /// Extract the token from an `Authorization` header value.
    pub fn parse_header(value: &str) -> Option<&str> {
        value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
