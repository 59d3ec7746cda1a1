use std::time::Duration;

use serde::{Deserialize, Serialize};
use mgit_types::ObjectId;

/// Outcome of a successful push.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    /// Objects the remote did not have and received.
    pub pushed_objects: usize,
    /// The remote branch tip after the push.
    pub new_remote_ref: ObjectId,
}

/// Outcome of fetching a remote branch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResult {
    pub new_objects: usize,
    /// Remote branch tip, `None` if the branch does not exist remotely.
    pub remote_tip: Option<ObjectId>,
}

/// Outcome of a successful pull.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResult {
    pub new_objects: usize,
    pub new_remote_ref: Option<ObjectId>,
    pub merge_status: MergeStatus,
}

/// How a pull changed the local branch. Diverged histories are reported as
/// [`crate::SyncError::MergeRequired`] instead.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeStatus {
    /// Local already contains the remote tip.
    #[default]
    UpToDate,
    /// Local branch moved forward to the remote tip.
    FastForward { from: Option<ObjectId>, to: ObjectId },
}

/// Local branch compared with its remote-tracking ref.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    /// Both point at the same commit.
    Synced,
    /// Local has commits the remote does not.
    Ahead,
    /// The remote has commits local does not.
    Behind,
    /// Both have commits the other lacks.
    Diverged,
    /// Never pushed or fetched.
    Unpublished,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Synced => "synced",
            Self::Ahead => "ahead",
            Self::Behind => "behind",
            Self::Diverged => "diverged",
            Self::Unpublished => "unpublished",
        };
        f.write_str(s)
    }
}

/// Bounded exponential backoff for transient failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
