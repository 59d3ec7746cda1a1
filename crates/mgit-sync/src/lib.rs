//! Synchronization between MGit repositories.
//!
//! Push and pull run over a [`RemoteTransport`]: [`HttpTransport`] talks to
//! an MGit server, [`LocalTransport`] to an in-process [`HostedRepository`].
//! Pulled history is signature-checked before any ref moves, and every
//! remote ref update is a compare-and-swap on the value the client last saw.

pub mod cache;
pub mod engine;
pub mod error;
pub mod hosted;
pub mod http;
pub mod local;
pub mod transport;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use cache::TtlCache;
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use hosted::HostedRepository;
pub use http::HttpTransport;
pub use local::LocalTransport;
pub use transport::RemoteTransport;
pub use types::{FetchResult, MergeStatus, PullResult, PushResult, RetryPolicy, SyncState};
