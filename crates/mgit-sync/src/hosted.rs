//! Server side of the sync protocol.
//!
//! A [`HostedRepository`] answers `has`/`fetch`, accepts uploaded objects
//! after checking each against its id, and moves branch refs only by
//! compare-and-swap, and only forward along its own commit graph.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};
use mgit_graph::CommitGraph;
use mgit_protocol::{ObjectPayload, RefUpdateResult};
use mgit_refs::{validate_branch_name, InMemoryRefStore, RefError, RefStore};
use mgit_store::{InMemoryObjectStore, ObjectStore};
use mgit_types::ObjectId;

use crate::error::{SyncError, SyncResult};

const BRANCH_PREFIX: &str = "refs/heads/";

#[derive(Clone, Debug)]
pub struct HostedRepository {
    graph: CommitGraph,
}

impl HostedRepository {
    pub fn new(store: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self {
            graph: CommitGraph::new(store, refs),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryRefStore::new()),
        )
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.graph.store()
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        self.graph.refs()
    }

    pub fn list_refs(&self, prefix: &str) -> SyncResult<Vec<(String, ObjectId)>> {
        Ok(self.refs().list_refs(prefix)?)
    }

    /// The subset of `ids` not in the store, in request order.
    pub fn missing(&self, ids: &[ObjectId]) -> Vec<ObjectId> {
        let mut seen = HashSet::new();
        ids.iter()
            .filter(|id| seen.insert(**id) && !self.store().has(id))
            .copied()
            .collect()
    }

    /// Framed bytes for each requested object. Every id must exist.
    pub fn fetch(&self, ids: &[ObjectId]) -> SyncResult<Vec<ObjectPayload>> {
        ids.iter()
            .map(|id| {
                Ok(ObjectPayload {
                    id: *id,
                    bytes: self.store().get(id)?,
                })
            })
            .collect()
    }

    /// Store uploaded objects after checking that each hashes to its id.
    ///
    /// The whole batch is checked before anything is written. Returns the
    /// number of objects that were not already present.
    pub fn receive(&self, objects: &[ObjectPayload]) -> SyncResult<usize> {
        for object in objects {
            let actual = ObjectId::from_bytes(&object.bytes);
            if actual != object.id {
                warn!(claimed = %object.id.short_hex(), actual = %actual.short_hex(), "rejecting object with wrong id");
                return Err(SyncError::IntegrityError {
                    claimed: object.id,
                    actual,
                });
            }
        }
        let mut stored = 0;
        for object in objects {
            if !self.store().has(&object.id) {
                self.store().put(&object.bytes)?;
                stored += 1;
            }
        }
        debug!(received = objects.len(), stored, "received objects");
        Ok(stored)
    }

    /// Compare-and-swap a branch ref, accepting only fast-forwards to a
    /// fully present, fully signed history.
    pub fn update_ref(
        &self,
        name: &str,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> SyncResult<RefUpdateResult> {
        let branch = name
            .strip_prefix(BRANCH_PREFIX)
            .ok_or_else(|| RefError::InvalidRefName {
                name: name.to_string(),
                reason: "only branches can be updated remotely".into(),
            })?;
        validate_branch_name(branch)?;

        let current = self.refs().read_ref(name)?;
        if current != expected_old {
            return Ok(self.reject(name, current, "remote ref moved"));
        }

        let commit = self.graph.get_commit(&new)?;
        if !self.store().has(&commit.tree) {
            return Err(SyncError::NotFound(format!(
                "tree {} of commit {}",
                commit.tree.short_hex(),
                new.short_hex()
            )));
        }
        let report = self.graph.verify_chain(&new)?;
        if let Some(bad) = report.first_invalid {
            return Ok(self.reject(
                name,
                current,
                &format!("commit {} is not validly signed", bad.short_hex()),
            ));
        }
        if let Some(old) = current {
            if !self.graph.is_ancestor(&old, &new)? {
                return Ok(self.reject(name, current, "non-fast-forward"));
            }
        }

        match self.refs().compare_and_swap(name, expected_old, new) {
            Ok(()) => {
                info!(name, from = ?expected_old.map(|o| o.short_hex()), to = %new.short_hex(), "ref updated");
                Ok(RefUpdateResult::Ok {
                    name: name.to_string(),
                })
            }
            Err(RefError::CasFailed { actual, .. }) => {
                Ok(self.reject(name, actual, "remote ref moved"))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reject(&self, name: &str, current: Option<ObjectId>, reason: &str) -> RefUpdateResult {
        warn!(name, ?current, reason, "ref update rejected");
        RefUpdateResult::Rejected {
            name: name.to_string(),
            current,
            reason: reason.to_string(),
        }
    }
}
