//! Repository configuration stored as TOML at `.mgit/config`.
//!
//! ```toml
//! [user]
//! pubkey = "<64 hex>"
//!
//! [remote.origin]
//! url = "https://mgit.example.org/alice"
//!
//! [sync]
//! max_retries = 3
//! retry_base_ms = 200
//! has_cache_ttl_secs = 300
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use mgit_store::fs::write_atomic;
use mgit_sync::RetryPolicy;
use mgit_types::NostrPubkey;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub user: UserConfig,
    #[serde(rename = "remote")]
    pub remotes: BTreeMap<String, RemoteConfig>,
    pub sync: SyncConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    /// Commits must be signed by this key when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<NostrPubkey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub has_cache_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_retries: retry.max_retries,
            retry_base_ms: u64::try_from(retry.base_delay.as_millis()).unwrap_or(u64::MAX),
            has_cache_ttl_secs: 300,
        }
    }
}

impl SyncConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            ..RetryPolicy::default()
        }
    }

    /// How long a remote's "has object" answers stay cached.
    pub fn has_cache_ttl(&self) -> SdkResult<chrono::Duration> {
        i64::try_from(self.has_cache_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                SdkError::Config(format!(
                    "sync.has_cache_ttl_secs out of range: {}",
                    self.has_cache_ttl_secs
                ))
            })
    }
}

impl RepoConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> SdkResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => toml::from_str(&text)
                .map_err(|e| SdkError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> SdkResult<()> {
        let text = toml::to_string_pretty(self).map_err(|e| SdkError::Config(e.to_string()))?;
        write_atomic(path, text.as_bytes())?;
        Ok(())
    }

    pub fn remote_url(&self, name: &str) -> SdkResult<&str> {
        self.remotes
            .get(name)
            .map(|r| r.url.as_str())
            .ok_or_else(|| SdkError::RemoteNotFound(name.to_string()))
    }
}
