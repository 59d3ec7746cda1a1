use async_trait::async_trait;
use mgit_protocol::ObjectPayload;
use mgit_types::ObjectId;

use crate::error::SyncResult;

/// Transport interface for remote MGit repositories.
///
/// Implementations move objects and refs; reachability, verification and
/// fast-forward decisions on the client side live in [`crate::SyncEngine`].
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Refs on the remote whose names start with `prefix`.
    async fn list_refs(&self, prefix: &str) -> SyncResult<Vec<(String, ObjectId)>>;

    /// The subset of `ids` the remote does not have.
    async fn missing_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectId>>;

    /// Framed bytes of the requested objects.
    async fn fetch_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectPayload>>;

    /// Upload objects; returns how many the remote stored.
    async fn push_objects(&self, objects: Vec<ObjectPayload>) -> SyncResult<usize>;

    /// Move `name` from `expected_old` to `new`. Fails with
    /// `NonFastForward` if the remote ref is elsewhere or `new` does not
    /// descend from it.
    async fn update_ref(
        &self,
        name: &str,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> SyncResult<()>;
}
