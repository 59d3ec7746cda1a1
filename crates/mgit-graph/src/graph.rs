//! The commit graph manager.
//!
//! [`CommitGraph`] ties an object store to a ref store. It is the only
//! component that creates commits, and it walks history for logs, ancestry
//! queries, and chain verification.
//!
//! # Invariants
//!
//! - A branch only moves through compare-and-swap, and only to a commit
//!   whose first parent is the tip it replaced.
//! - Every commit written carries a signature that verified at write time.
//! - Walks never consult timestamps; order comes from parent links alone.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use mgit_refs::{branch_ref, RefStore};
use mgit_store::{Commit, ObjectStore, SignatureStatus};
use mgit_types::ObjectId;

use crate::draft::StagedCommit;
use crate::error::{GraphError, GraphResult};
use crate::identity::SigningIdentity;
use crate::tree::{build_tree, StagedEntry};

/// Result of [`CommitGraph::verify_chain`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    /// `true` if every reachable commit verified.
    pub valid: bool,
    /// The first commit (in walk order) that failed, if any.
    pub first_invalid: Option<ObjectId>,
    /// Why `first_invalid` failed.
    pub failure: Option<SignatureStatus>,
    /// Number of commits examined, including the failing one.
    pub checked: usize,
}

/// Commit graph over an object store and a ref store.
#[derive(Clone)]
pub struct CommitGraph {
    store: Arc<dyn ObjectStore>,
    refs: Arc<dyn RefStore>,
}

impl CommitGraph {
    pub fn new(store: Arc<dyn ObjectStore>, refs: Arc<dyn RefStore>) -> Self {
        Self { store, refs }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn refs(&self) -> &Arc<dyn RefStore> {
        &self.refs
    }

    // ---------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------

    /// Build nested trees for the staged entries; returns the root tree id.
    pub fn build_tree(&self, entries: &[StagedEntry]) -> GraphResult<ObjectId> {
        build_tree(self.store.as_ref(), entries)
    }

    /// Commit `tree` on the current branch, signed by `identity`.
    pub fn commit(
        &self,
        tree: ObjectId,
        parents: &[ObjectId],
        identity: &dyn SigningIdentity,
        message: &str,
    ) -> GraphResult<ObjectId> {
        let branch = self.refs.current_branch()?;
        self.commit_on(
            &branch,
            tree,
            parents,
            identity,
            message,
            chrono::Utc::now().timestamp(),
        )
    }

    /// Commit on a named branch with an explicit timestamp.
    ///
    /// `parents` must be empty on an unborn branch and must start with the
    /// branch tip otherwise; further parents make a merge commit.
    pub fn commit_on(
        &self,
        branch: &str,
        tree: ObjectId,
        parents: &[ObjectId],
        identity: &dyn SigningIdentity,
        message: &str,
        timestamp: i64,
    ) -> GraphResult<ObjectId> {
        let ref_name = branch_ref(branch);
        let tip = self.refs.read_ref(&ref_name)?;
        if tip != parents.first().copied() {
            warn!(branch, ?tip, "commit parents do not match branch tip");
            return Err(GraphError::DivergedParent {
                branch: branch.to_string(),
                tip,
                first_parent: parents.first().copied(),
            });
        }

        // Both must exist and be of the right kind before anything is signed.
        self.store.get_tree(&tree)?;
        for parent in parents {
            self.store.get_commit(parent)?;
        }

        let staged = StagedCommit::new(
            tree,
            parents.to_vec(),
            identity.public_key(),
            timestamp,
            message,
        );
        let signed = staged.sign(identity)?;
        let persisted = signed.persist(self.store.as_ref(), self.refs.as_ref(), &ref_name, tip)?;

        info!(
            commit = %persisted.id.short_hex(),
            branch,
            author = %identity.public_key().short_id(),
            parents = parents.len(),
            "created commit"
        );
        Ok(persisted.id)
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    pub fn get_commit(&self, id: &ObjectId) -> GraphResult<Commit> {
        Ok(self.store.get_commit(id)?)
    }

    /// Lazy first-parent history starting at `from`, newest first.
    pub fn log(&self, from: ObjectId) -> Log {
        Log {
            store: Arc::clone(&self.store),
            next: Some(from),
        }
    }

    /// Whether `ancestor` is reachable from `descendant` (or equal to it).
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> GraphResult<bool> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([*descendant]);
        while let Some(id) = queue.pop_front() {
            if id == *ancestor {
                return Ok(true);
            }
            if !seen.insert(id) {
                continue;
            }
            queue.extend(self.store.get_commit(&id)?.parents);
        }
        Ok(false)
    }

    /// Verify every commit reachable from `from`.
    ///
    /// Breadth-first over all parents, each commit once. The walk stops at
    /// the first commit whose signature is missing or invalid, or whose
    /// stored bytes fail their integrity check. A missing object is an
    /// error, not a verification failure.
    pub fn verify_chain(&self, from: &ObjectId) -> GraphResult<ChainReport> {
        let mut seen = HashSet::from([*from]);
        let mut queue = VecDeque::from([*from]);
        let mut checked = 0;

        while let Some(id) = queue.pop_front() {
            checked += 1;
            let commit = match self.store.get_commit(&id) {
                Ok(commit) => commit,
                Err(e) => {
                    let e = GraphError::from(e);
                    if e.is_integrity_failure() {
                        warn!(commit = %id.short_hex(), error = %e, "chain verification hit corrupt object");
                        return Ok(ChainReport {
                            valid: false,
                            first_invalid: Some(id),
                            failure: Some(SignatureStatus::Invalid),
                            checked,
                        });
                    }
                    return Err(e);
                }
            };

            let status = commit.verify();
            if status != SignatureStatus::Verified {
                warn!(commit = %id.short_hex(), ?status, "chain verification failed");
                return Ok(ChainReport {
                    valid: false,
                    first_invalid: Some(id),
                    failure: Some(status),
                    checked,
                });
            }

            for parent in commit.parents {
                if seen.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        debug!(tip = %from.short_hex(), checked, "chain verified");
        Ok(ChainReport {
            valid: true,
            first_invalid: None,
            failure: None,
            checked,
        })
    }
}

impl std::fmt::Debug for CommitGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitGraph").finish_non_exhaustive()
    }
}

/// First-parent history iterator returned by [`CommitGraph::log`].
///
/// Each call to `next` loads one commit. After an error the iterator is
/// exhausted.
pub struct Log {
    store: Arc<dyn ObjectStore>,
    next: Option<ObjectId>,
}

impl Iterator for Log {
    type Item = GraphResult<(ObjectId, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next.take()?;
        match self.store.get_commit(&id) {
            Ok(commit) => {
                self.next = commit.parents.first().copied();
                Some(Ok((id, commit)))
            }
            Err(e) => Some(Err(e.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::TestProvider;
    use crate::identity::{LocalIdentity, ProviderIdentity};
    use mgit_crypto::SigningKey;
    use mgit_refs::InMemoryRefStore;
    use mgit_store::InMemoryObjectStore;

    struct Fixture {
        graph: CommitGraph,
        store: Arc<InMemoryObjectStore>,
        identity: LocalIdentity,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryObjectStore::new());
        let refs = Arc::new(InMemoryRefStore::new());
        refs.set_head("main").unwrap();
        let graph = CommitGraph::new(store.clone(), refs);
        Fixture {
            graph,
            store,
            identity: LocalIdentity::new(SigningKey::from_bytes(&[4u8; 32]).unwrap()),
        }
    }

    impl Fixture {
        fn tree(&self, content: &[u8]) -> ObjectId {
            let blob = self.store.put_blob(content).unwrap();
            self.graph
                .build_tree(&[StagedEntry::file("medical-history.json", blob)])
                .unwrap()
        }

        fn tip(&self) -> Option<ObjectId> {
            self.graph.refs().resolve_head().unwrap()
        }

        fn commit(&self, content: &[u8], message: &str) -> ObjectId {
            let tree = self.tree(content);
            let parents: Vec<ObjectId> = self.tip().into_iter().collect();
            self.graph
                .commit(tree, &parents, &self.identity, message)
                .unwrap()
        }

        /// Commit whose signature was made by a key other than its author.
        fn forged_commit(&self, message: &str) -> ObjectId {
            let parent = self.tip().unwrap();
            let tree = self.tree(message.as_bytes());
            let commit = Commit::new(tree, vec![parent], self.identity.public_key(), 5, message);
            let forger = SigningKey::generate();
            let sig = mgit_crypto::sign(&commit.signable_bytes(), &forger).unwrap();
            let id = self.store.put_commit(&commit.with_signature(sig)).unwrap();
            self.graph
                .refs()
                .compare_and_swap("refs/heads/main", Some(parent), id)
                .unwrap();
            id
        }
    }

    // ---------------------------------------------------------------
    // commit
    // ---------------------------------------------------------------

    #[test]
    fn root_commit_has_no_parents() {
        let fx = fixture();
        let id = fx.commit(b"[]", "init");
        let commit = fx.graph.get_commit(&id).unwrap();
        assert!(commit.parents.is_empty());
        assert_eq!(commit.message, "init");
        assert_eq!(commit.author, fx.identity.public_key());
        assert_eq!(commit.verify(), SignatureStatus::Verified);
        assert_eq!(fx.tip(), Some(id));
    }

    #[test]
    fn second_commit_links_to_first() {
        let fx = fixture();
        let first = fx.commit(b"[]", "init");
        let second = fx.commit(b"[{\"bp\":120}]", "add record");
        assert_eq!(fx.graph.get_commit(&second).unwrap().parents, vec![first]);
    }

    #[test]
    fn parent_on_unborn_branch_diverges() {
        let fx = fixture();
        let tree = fx.tree(b"x");
        let bogus = ObjectId::from_bytes(b"bogus");
        assert!(matches!(
            fx.graph.commit(tree, &[bogus], &fx.identity, "m"),
            Err(GraphError::DivergedParent { tip: None, .. })
        ));
    }

    #[test]
    fn stale_parent_diverges() {
        let fx = fixture();
        let first = fx.commit(b"1", "one");
        let _second = fx.commit(b"2", "two");
        let tree = fx.tree(b"3");
        assert!(matches!(
            fx.graph.commit(tree, &[first], &fx.identity, "three"),
            Err(GraphError::DivergedParent { .. })
        ));
    }

    #[test]
    fn omitted_parent_on_existing_branch_diverges() {
        let fx = fixture();
        fx.commit(b"1", "one");
        let tree = fx.tree(b"2");
        assert!(matches!(
            fx.graph.commit(tree, &[], &fx.identity, "orphan"),
            Err(GraphError::DivergedParent { .. })
        ));
    }

    #[test]
    fn missing_tree_is_not_found() {
        let fx = fixture();
        let result = fx
            .graph
            .commit(ObjectId::from_bytes(b"nope"), &[], &fx.identity, "m");
        assert!(matches!(
            result,
            Err(GraphError::Store(mgit_store::StoreError::NotFound(_)))
        ));
        assert_eq!(fx.tip(), None);
    }

    #[test]
    fn merge_commit_records_all_parents() {
        let fx = fixture();
        let base = fx.commit(b"base", "base");
        let main_tip = fx.commit(b"main", "main work");

        // Side branch from base.
        let side_tree = fx.tree(b"side");
        let side = fx
            .graph
            .commit_on("side", side_tree, &[], &fx.identity, "side root", 1)
            .unwrap();

        let merged_tree = fx.tree(b"merged");
        let merge = fx
            .graph
            .commit(merged_tree, &[main_tip, side], &fx.identity, "merge")
            .unwrap();
        let commit = fx.graph.get_commit(&merge).unwrap();
        assert_eq!(commit.parents, vec![main_tip, side]);
        assert!(fx.graph.is_ancestor(&base, &merge).unwrap());
        assert!(fx.graph.is_ancestor(&side, &merge).unwrap());
    }

    #[test]
    fn commit_with_provider_identity() {
        let fx = fixture();
        let key = SigningKey::generate();
        let provider = Arc::new(TestProvider::with_key("patient", key.clone()));
        let identity = ProviderIdentity::new(provider, "patient").unwrap();

        let tree = fx.tree(b"[]");
        let id = fx.graph.commit(tree, &[], &identity, "init").unwrap();
        assert_eq!(fx.graph.get_commit(&id).unwrap().author, key.public_key());
    }

    // ---------------------------------------------------------------
    // log
    // ---------------------------------------------------------------

    #[test]
    fn log_walks_first_parent_newest_first() {
        let fx = fixture();
        let init = fx.commit(b"[]", "init");
        let second = fx.commit(b"[1]", "append");
        let ids: Vec<ObjectId> = fx
            .graph
            .log(second)
            .map(|r| r.unwrap().0)
            .collect();
        assert_eq!(ids, vec![second, init]);
    }

    #[test]
    fn log_is_restartable() {
        let fx = fixture();
        fx.commit(b"a", "a");
        let tip = fx.commit(b"b", "b");
        assert_eq!(fx.graph.log(tip).count(), 2);
        assert_eq!(fx.graph.log(tip).count(), 2);
    }

    #[test]
    fn log_is_lazy() {
        let fx = fixture();
        let mut log = fx.graph.log(ObjectId::from_bytes(b"missing"));
        assert!(log.next().unwrap().is_err());
        assert!(log.next().is_none());
    }

    // ---------------------------------------------------------------
    // verify_chain
    // ---------------------------------------------------------------

    #[test]
    fn valid_chain() {
        let fx = fixture();
        fx.commit(b"1", "1");
        fx.commit(b"2", "2");
        let tip = fx.commit(b"3", "3");
        let report = fx.graph.verify_chain(&tip).unwrap();
        assert!(report.valid);
        assert_eq!(report.checked, 3);
        assert_eq!(report.first_invalid, None);
    }

    #[test]
    fn forged_commit_is_first_invalid() {
        let fx = fixture();
        fx.commit(b"1", "1");
        fx.commit(b"2", "2");
        let forged = fx.forged_commit("tampered");
        fx.commit(b"4", "4");
        let tip = fx.commit(b"5", "5");

        let report = fx.graph.verify_chain(&tip).unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid, Some(forged));
        assert_eq!(report.failure, Some(SignatureStatus::Invalid));
        // Two newer commits plus the forged one; nothing older is examined.
        assert_eq!(report.checked, 3);
    }

    #[test]
    fn unsigned_commit_is_reported_as_such() {
        let fx = fixture();
        let parent = fx.commit(b"1", "1");
        let tree = fx.tree(b"2");
        let unsigned = Commit::new(tree, vec![parent], fx.identity.public_key(), 9, "nosig");
        let id = fx.store.put_commit(&unsigned).unwrap();

        let report = fx.graph.verify_chain(&id).unwrap();
        assert_eq!(report.first_invalid, Some(id));
        assert_eq!(report.failure, Some(SignatureStatus::Unsigned));
    }

    #[test]
    fn corrupted_bytes_are_reported_at_that_commit() {
        let fx = fixture();
        let first = fx.commit(b"1", "1");
        let tip = fx.commit(b"2", "2");
        fx.store
            .overwrite_raw(first, b"commit 5\0bogus".to_vec());

        let report = fx.graph.verify_chain(&tip).unwrap();
        assert_eq!(report.first_invalid, Some(first));
        assert_eq!(report.checked, 2);
    }

    #[test]
    fn merge_parents_visited_once() {
        let fx = fixture();
        let base = fx.commit(b"base", "base");
        let side_tree = fx.tree(b"side");
        // Side branch forks from base.
        fx.graph
            .refs()
            .write_ref("refs/heads/side", base)
            .unwrap();
        let side = fx
            .graph
            .commit_on("side", side_tree, &[base], &fx.identity, "side", 2)
            .unwrap();
        let main = fx.commit(b"main", "main");
        let tree = fx.tree(b"merge");
        let merge = fx
            .graph
            .commit(tree, &[main, side], &fx.identity, "merge")
            .unwrap();

        let report = fx.graph.verify_chain(&merge).unwrap();
        assert!(report.valid);
        // merge, main, side, base
        assert_eq!(report.checked, 4);
    }

    #[test]
    fn is_ancestor_is_directional() {
        let fx = fixture();
        let a = fx.commit(b"a", "a");
        let b = fx.commit(b"b", "b");
        assert!(fx.graph.is_ancestor(&a, &b).unwrap());
        assert!(!fx.graph.is_ancestor(&b, &a).unwrap());
        assert!(fx.graph.is_ancestor(&a, &a).unwrap());
    }
}
