use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use mgit_graph::{CommitGraph, LocalIdentity, SigningIdentity, StagedEntry};
use mgit_protocol::ObjectPayload;
use mgit_refs::{branch_ref, InMemoryRefStore, RefStore};
use mgit_store::{InMemoryObjectStore, ObjectStore};
use mgit_types::{NostrPubkey, ObjectId};

/// An in-memory repository with its own signing identity.
pub(crate) struct Client {
    pub graph: CommitGraph,
    pub identity: LocalIdentity,
    clock: AtomicI64,
}

impl Client {
    pub fn new() -> Self {
        Self::with_identity(LocalIdentity::generate())
    }

    pub fn with_identity(identity: LocalIdentity) -> Self {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let refs: Arc<dyn RefStore> = Arc::new(InMemoryRefStore::new());
        Self {
            graph: CommitGraph::new(store, refs),
            identity,
            clock: AtomicI64::new(1_700_000_000),
        }
    }

    pub fn identity_key(&self) -> NostrPubkey {
        self.identity.public_key()
    }

    pub fn tip(&self, branch: &str) -> Option<ObjectId> {
        self.graph.refs().read_ref(&branch_ref(branch)).unwrap()
    }

    /// Commit a single-file tree on top of the branch tip.
    pub fn commit(&self, branch: &str, path: &str, content: &str, message: &str) -> ObjectId {
        let blob = self.graph.store().put_blob(content.as_bytes()).unwrap();
        let tree = self
            .graph
            .build_tree(&[StagedEntry::file(path, blob)])
            .unwrap();
        let parents: Vec<ObjectId> = self.tip(branch).into_iter().collect();
        let ts = self.clock.fetch_add(1, Ordering::SeqCst);
        self.graph
            .commit_on(branch, tree, &parents, &self.identity, message, ts)
            .unwrap()
    }

    pub fn all_objects(&self) -> Vec<ObjectPayload> {
        let store = self.graph.store();
        store
            .object_ids()
            .unwrap()
            .into_iter()
            .map(|id| ObjectPayload {
                id,
                bytes: store.get(&id).unwrap(),
            })
            .collect()
    }
}
