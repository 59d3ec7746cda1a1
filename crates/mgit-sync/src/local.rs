use std::sync::Arc;

use async_trait::async_trait;
use mgit_protocol::{ObjectPayload, RefUpdateResult};
use mgit_types::ObjectId;

use crate::error::{SyncError, SyncResult};
use crate::hosted::HostedRepository;
use crate::transport::RemoteTransport;

/// In-process transport talking directly to a [`HostedRepository`].
#[derive(Clone, Debug)]
pub struct LocalTransport {
    remote: Arc<HostedRepository>,
}

impl LocalTransport {
    pub fn new(remote: Arc<HostedRepository>) -> Self {
        Self { remote }
    }

    pub fn remote(&self) -> &Arc<HostedRepository> {
        &self.remote
    }
}

#[async_trait]
impl RemoteTransport for LocalTransport {
    async fn list_refs(&self, prefix: &str) -> SyncResult<Vec<(String, ObjectId)>> {
        self.remote.list_refs(prefix)
    }

    async fn missing_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectId>> {
        Ok(self.remote.missing(ids))
    }

    async fn fetch_objects(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectPayload>> {
        self.remote.fetch(ids)
    }

    async fn push_objects(&self, objects: Vec<ObjectPayload>) -> SyncResult<usize> {
        self.remote.receive(&objects)
    }

    async fn update_ref(
        &self,
        name: &str,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> SyncResult<()> {
        match self.remote.update_ref(name, expected_old, new)? {
            RefUpdateResult::Ok { .. } => Ok(()),
            RefUpdateResult::Rejected { name, current, .. } => Err(SyncError::NonFastForward {
                name,
                remote: current,
            }),
        }
    }
}
