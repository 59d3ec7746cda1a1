//! Push and pull.
//!
//! Objects always travel before refs: a push uploads everything the remote
//! lacks and only then asks it to move the branch; a pull stores and
//! verifies the fetched history before touching the remote-tracking ref or
//! the local branch. Dropping either future part way leaves refs where
//! they were, with at most some unreferenced objects stored.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, warn};
use mgit_graph::CommitGraph;
use mgit_protocol::{ObjectPayload, MAX_BATCH_BYTES};
use mgit_refs::{branch_ref, remote_ref, validate_remote_name, RefStore};
use mgit_store::{Commit, EntryMode, ObjectKind, ObjectStore, StoredObject, Tree};
use mgit_types::ObjectId;

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteTransport;
use crate::types::{FetchResult, MergeStatus, PullResult, PushResult, SyncState};

/// Ids per `has`/`fetch` request.
const ID_BATCH: usize = 4096;

/// Client-side sync over a local commit graph.
#[derive(Clone, Debug)]
pub struct SyncEngine {
    graph: CommitGraph,
}

impl SyncEngine {
    pub fn new(graph: CommitGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    fn store(&self) -> &dyn ObjectStore {
        self.graph.store().as_ref()
    }

    fn refs(&self) -> &dyn RefStore {
        self.graph.refs().as_ref()
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    /// Publish the local `branch` to `remote`.
    ///
    /// Fails with `NonFastForward` if the remote branch holds commits the
    /// local branch does not contain, either as seen before uploading or
    /// when the remote's compare-and-swap loses a race.
    pub async fn push(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> SyncResult<PushResult> {
        validate_remote_name(remote)?;
        let name = branch_ref(branch);
        let local_tip = self
            .refs()
            .read_ref(&name)?
            .ok_or_else(|| SyncError::NotFound(format!("branch {branch} has no commits")))?;
        let remote_tip = remote_tip(transport, &name).await?;
        let tracking = remote_ref(remote, branch);

        if remote_tip == Some(local_tip) {
            self.refs().write_ref(&tracking, local_tip)?;
            debug!(remote, branch, "remote already up to date");
            return Ok(PushResult {
                pushed_objects: 0,
                new_remote_ref: local_tip,
            });
        }

        let exclude = match remote_tip {
            Some(theirs) => {
                if !self.store().has(&theirs) || !self.graph.is_ancestor(&theirs, &local_tip)? {
                    warn!(remote, branch, remote_tip = %theirs.short_hex(), "push would not fast-forward");
                    return Err(SyncError::NonFastForward {
                        name,
                        remote: Some(theirs),
                    });
                }
                self.ancestors(&[theirs])?
            }
            None => HashSet::new(),
        };

        let candidates = self.objects_to_send(local_tip, &exclude)?;
        let mut missing = Vec::new();
        for chunk in candidates.chunks(ID_BATCH) {
            missing.extend(transport.missing_objects(chunk).await?);
        }
        self.upload(transport, &missing).await?;
        transport.update_ref(&name, remote_tip, local_tip).await?;
        self.refs().write_ref(&tracking, local_tip)?;

        info!(
            remote,
            branch,
            objects = missing.len(),
            tip = %local_tip.short_hex(),
            "pushed"
        );
        Ok(PushResult {
            pushed_objects: missing.len(),
            new_remote_ref: local_tip,
        })
    }

    /// Every object reachable from `tip` that is not behind an excluded
    /// commit: commits, then their trees and blobs.
    fn objects_to_send(
        &self,
        tip: ObjectId,
        exclude: &HashSet<ObjectId>,
    ) -> SyncResult<Vec<ObjectId>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut commits = VecDeque::from([tip]);
        let mut trees = Vec::new();

        while let Some(id) = commits.pop_front() {
            if exclude.contains(&id) || !seen.insert(id) {
                continue;
            }
            let commit = self.store().get_commit(&id)?;
            out.push(id);
            trees.push(commit.tree);
            commits.extend(commit.parents);
        }
        while let Some(id) = trees.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            for entry in self.store().get_tree(&id)?.entries {
                if entry.mode == EntryMode::Directory {
                    trees.push(entry.object_id);
                } else if seen.insert(entry.object_id) {
                    out.push(entry.object_id);
                }
            }
        }
        Ok(out)
    }

    async fn upload(&self, transport: &dyn RemoteTransport, ids: &[ObjectId]) -> SyncResult<()> {
        let mut batch = Vec::new();
        let mut batch_bytes = 0;
        for id in ids {
            let bytes = self.store().get(id)?;
            if !batch.is_empty() && batch_bytes + bytes.len() > MAX_BATCH_BYTES {
                transport.push_objects(std::mem::take(&mut batch)).await?;
                batch_bytes = 0;
            }
            batch_bytes += bytes.len();
            batch.push(ObjectPayload { id: *id, bytes });
        }
        if !batch.is_empty() {
            transport.push_objects(batch).await?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fetch / pull
    // -----------------------------------------------------------------------

    /// Download the remote `branch`, verify its signatures, and move
    /// `refs/remotes/<remote>/<branch>`. The local branch is not touched.
    pub async fn fetch(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> SyncResult<FetchResult> {
        validate_remote_name(remote)?;
        let name = branch_ref(branch);
        let Some(tip) = remote_tip(transport, &name).await? else {
            debug!(remote, branch, "remote branch does not exist");
            return Ok(FetchResult::default());
        };

        let tracking = remote_ref(remote, branch);
        let roots: Vec<ObjectId> = [self.refs().read_ref(&name)?, self.refs().read_ref(&tracking)?]
            .into_iter()
            .flatten()
            .collect();
        let known = self.ancestors(&roots)?;
        let new_objects = self.fetch_closure(transport, tip, &known).await?;

        let report = self.graph.verify_chain(&tip)?;
        if let Some(commit) = report.first_invalid {
            warn!(remote, branch, commit = %commit.short_hex(), "fetched history failed verification");
            return Err(SyncError::VerificationFailed { commit });
        }
        self.refs().write_ref(&tracking, tip)?;

        info!(remote, branch, new_objects, tip = %tip.short_hex(), "fetched");
        Ok(FetchResult {
            new_objects,
            remote_tip: Some(tip),
        })
    }

    /// Fetch objects reachable from `tip` that are not present locally.
    ///
    /// Commits in `known` are complete locally and are not descended into.
    /// Other objects already present are still walked, so a previously
    /// interrupted fetch is completed.
    async fn fetch_closure(
        &self,
        transport: &dyn RemoteTransport,
        tip: ObjectId,
        known: &HashSet<ObjectId>,
    ) -> SyncResult<usize> {
        let mut seen = HashSet::new();
        let mut frontier = vec![(tip, ObjectKind::Commit)];
        let mut fetched = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            let mut wanted = Vec::new();
            for (id, kind) in frontier.drain(..) {
                if !seen.insert(id) || known.contains(&id) {
                    continue;
                }
                if !self.store().has(&id) {
                    wanted.push(id);
                } else if kind != ObjectKind::Blob {
                    next.extend(references(&self.store().get_object(&id)?)?);
                }
            }

            for chunk in wanted.chunks(ID_BATCH) {
                let mut pending: HashSet<ObjectId> = chunk.iter().copied().collect();
                for payload in transport.fetch_objects(chunk).await? {
                    if !pending.remove(&payload.id) {
                        return Err(SyncError::RemoteError(format!(
                            "unrequested object {}",
                            payload.id.short_hex()
                        )));
                    }
                    let actual = ObjectId::from_bytes(&payload.bytes);
                    if actual != payload.id {
                        return Err(SyncError::IntegrityError {
                            claimed: payload.id,
                            actual,
                        });
                    }
                    let object = StoredObject::decode(&payload.bytes)?;
                    self.store().put(&payload.bytes)?;
                    next.extend(references(&object)?);
                    fetched += 1;
                }
                if let Some(id) = pending.iter().next() {
                    return Err(SyncError::NotFound(format!(
                        "remote did not send object {}",
                        id.short_hex()
                    )));
                }
            }
            frontier = next;
        }
        Ok(fetched)
    }

    /// Fast-forward the local `branch` to `remote_tip` if possible.
    ///
    /// A local branch already containing `remote_tip` is left alone;
    /// diverged histories fail with `MergeRequired`.
    pub fn fast_forward(&self, branch: &str, remote_tip: ObjectId) -> SyncResult<MergeStatus> {
        let name = branch_ref(branch);
        let local = self.refs().read_ref(&name)?;
        match local {
            Some(l) if l == remote_tip => Ok(MergeStatus::UpToDate),
            Some(l) if self.graph.is_ancestor(&remote_tip, &l)? => Ok(MergeStatus::UpToDate),
            Some(l) if !self.graph.is_ancestor(&l, &remote_tip)? => {
                warn!(branch, local = %l.short_hex(), remote = %remote_tip.short_hex(), "histories diverged");
                Err(SyncError::MergeRequired {
                    branch: branch.to_string(),
                    local: l,
                    remote: remote_tip,
                })
            }
            _ => {
                self.refs().compare_and_swap(&name, local, remote_tip)?;
                debug!(branch, to = %remote_tip.short_hex(), "fast-forwarded");
                Ok(MergeStatus::FastForward {
                    from: local,
                    to: remote_tip,
                })
            }
        }
    }

    /// `fetch` followed by `fast_forward`.
    pub async fn pull(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
        branch: &str,
    ) -> SyncResult<PullResult> {
        let fetched = self.fetch(transport, remote, branch).await?;
        let merge_status = match fetched.remote_tip {
            Some(tip) => self.fast_forward(branch, tip)?,
            None => MergeStatus::UpToDate,
        };
        Ok(PullResult {
            new_objects: fetched.new_objects,
            new_remote_ref: fetched.remote_tip,
            merge_status,
        })
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    /// Compare the local branch with its remote-tracking ref. No network.
    pub fn sync_state(&self, remote: &str, branch: &str) -> SyncResult<SyncState> {
        let local = self.refs().read_ref(&branch_ref(branch))?;
        let tracking = self.refs().read_ref(&remote_ref(remote, branch))?;
        let state = match (local, tracking) {
            (_, None) => SyncState::Unpublished,
            (None, Some(_)) => SyncState::Behind,
            (Some(l), Some(r)) if l == r => SyncState::Synced,
            (Some(l), Some(r)) if self.graph.is_ancestor(&r, &l)? => SyncState::Ahead,
            (Some(l), Some(r)) if self.graph.is_ancestor(&l, &r)? => SyncState::Behind,
            _ => SyncState::Diverged,
        };
        Ok(state)
    }

    /// All commits reachable from `roots`.
    fn ancestors(&self, roots: &[ObjectId]) -> SyncResult<HashSet<ObjectId>> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ObjectId> = roots.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            queue.extend(self.store().get_commit(&id)?.parents);
        }
        Ok(seen)
    }
}

async fn remote_tip(transport: &dyn RemoteTransport, name: &str) -> SyncResult<Option<ObjectId>> {
    Ok(transport
        .list_refs(name)
        .await?
        .into_iter()
        .find(|(n, _)| n == name)
        .map(|(_, id)| id))
}

/// Ids an object points at, tagged with the kind expected there.
fn references(object: &StoredObject) -> SyncResult<Vec<(ObjectId, ObjectKind)>> {
    Ok(match object.kind {
        ObjectKind::Blob => Vec::new(),
        ObjectKind::Tree => Tree::from_stored_object(object)?
            .entries
            .into_iter()
            .map(|e| {
                let kind = if e.mode == EntryMode::Directory {
                    ObjectKind::Tree
                } else {
                    ObjectKind::Blob
                };
                (e.object_id, kind)
            })
            .collect(),
        ObjectKind::Commit => {
            let commit = Commit::from_stored_object(object)?;
            std::iter::once((commit.tree, ObjectKind::Tree))
                .chain(commit.parents.into_iter().map(|p| (p, ObjectKind::Commit)))
                .collect()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::fixtures::Client;
    use crate::hosted::HostedRepository;
    use crate::local::LocalTransport;

    fn remote() -> LocalTransport {
        LocalTransport::new(Arc::new(HostedRepository::in_memory()))
    }

    fn engine(client: &Client) -> SyncEngine {
        SyncEngine::new(client.graph.clone())
    }

    // -----------------------------------------------------------------------
    // push
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn push_to_empty_remote() {
        let client = Client::new();
        client.commit("main", "a.txt", "1", "one");
        let tip = client.commit("main", "a.txt", "2", "two");
        let transport = remote();

        let result = engine(&client).push(&transport, "origin", "main").await.unwrap();
        assert_eq!(result.new_remote_ref, tip);
        // 2 commits, 2 trees, 2 blobs
        assert_eq!(result.pushed_objects, 6);
        assert_eq!(
            transport.remote().refs().read_ref("refs/heads/main").unwrap(),
            Some(tip)
        );
        assert_eq!(
            client.graph.refs().read_ref("refs/remotes/origin/main").unwrap(),
            Some(tip)
        );
        assert_eq!(
            engine(&client).sync_state("origin", "main").unwrap(),
            SyncState::Synced
        );
    }

    #[tokio::test]
    async fn second_push_sends_only_new_objects() {
        let client = Client::new();
        client.commit("main", "a.txt", "1", "one");
        let transport = remote();
        let sync = engine(&client);
        sync.push(&transport, "origin", "main").await.unwrap();

        client.commit("main", "b.txt", "1", "same blob as before");
        assert_eq!(sync.sync_state("origin", "main").unwrap(), SyncState::Ahead);
        let result = sync.push(&transport, "origin", "main").await.unwrap();
        // new commit and tree; the blob is already there
        assert_eq!(result.pushed_objects, 2);
    }

    #[tokio::test]
    async fn push_with_nothing_new_is_noop() {
        let client = Client::new();
        client.commit("main", "a.txt", "1", "one");
        let transport = remote();
        let sync = engine(&client);
        sync.push(&transport, "origin", "main").await.unwrap();
        let again = sync.push(&transport, "origin", "main").await.unwrap();
        assert_eq!(again.pushed_objects, 0);
    }

    #[tokio::test]
    async fn push_unborn_branch_fails() {
        let client = Client::new();
        assert!(matches!(
            engine(&client).push(&remote(), "origin", "main").await,
            Err(SyncError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn racing_pushes_second_is_rejected() {
        let identity = mgit_graph::LocalIdentity::generate();
        let alice = Client::with_identity(identity.clone());
        let base = alice.commit("main", "a.txt", "base", "base");
        let transport = remote();
        engine(&alice).push(&transport, "origin", "main").await.unwrap();

        let bob = Client::with_identity(identity);
        engine(&bob).pull(&transport, "origin", "main").await.unwrap();
        assert_eq!(bob.tip("main"), Some(base));

        let alice_tip = alice.commit("main", "a.txt", "alice", "alice");
        bob.commit("main", "a.txt", "bob", "bob");

        engine(&alice).push(&transport, "origin", "main").await.unwrap();
        let err = engine(&bob)
            .push(&transport, "origin", "main")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::NonFastForward { remote: Some(r), .. } if r == alice_tip
        ));
        assert_eq!(
            transport.remote().refs().read_ref("refs/heads/main").unwrap(),
            Some(alice_tip)
        );
    }

    // -----------------------------------------------------------------------
    // pull
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn pull_into_empty_clone() {
        let author = Client::new();
        author.commit("main", "a.txt", "1", "one");
        let tip = author.commit("main", "dir/b.txt", "2", "two");
        let transport = remote();
        engine(&author).push(&transport, "origin", "main").await.unwrap();

        let clone = Client::new();
        let result = engine(&clone).pull(&transport, "origin", "main").await.unwrap();
        assert_eq!(result.new_remote_ref, Some(tip));
        assert_eq!(
            result.merge_status,
            MergeStatus::FastForward { from: None, to: tip }
        );
        assert_eq!(clone.tip("main"), Some(tip));
        assert!(clone.graph.verify_chain(&tip).unwrap().valid);
        assert_eq!(result.new_objects, author.all_objects().len());
    }

    #[tokio::test]
    async fn pull_missing_branch_is_noop() {
        let clone = Client::new();
        let result = engine(&clone).pull(&remote(), "origin", "main").await.unwrap();
        assert_eq!(result, PullResult::default());
    }

    #[tokio::test]
    async fn pull_when_ahead_keeps_local() {
        let client = Client::new();
        client.commit("main", "a.txt", "1", "one");
        let transport = remote();
        let sync = engine(&client);
        sync.push(&transport, "origin", "main").await.unwrap();
        let local = client.commit("main", "a.txt", "2", "two");

        let result = sync.pull(&transport, "origin", "main").await.unwrap();
        assert_eq!(result.merge_status, MergeStatus::UpToDate);
        assert_eq!(client.tip("main"), Some(local));
    }

    #[tokio::test]
    async fn diverged_pull_requires_merge() {
        let identity = mgit_graph::LocalIdentity::generate();
        let alice = Client::with_identity(identity.clone());
        alice.commit("main", "a.txt", "base", "base");
        let transport = remote();
        engine(&alice).push(&transport, "origin", "main").await.unwrap();

        let bob = Client::with_identity(identity);
        let sync = engine(&bob);
        sync.pull(&transport, "origin", "main").await.unwrap();
        let bob_tip = bob.commit("main", "b.txt", "bob", "bob");
        let alice_tip = alice.commit("main", "a.txt", "alice", "alice");
        engine(&alice).push(&transport, "origin", "main").await.unwrap();

        let err = sync.pull(&transport, "origin", "main").await.unwrap_err();
        assert!(matches!(err, SyncError::MergeRequired { .. }));
        assert_eq!(bob.tip("main"), Some(bob_tip));
        // the remote-tracking ref still records what was fetched
        assert_eq!(
            bob.graph.refs().read_ref("refs/remotes/origin/main").unwrap(),
            Some(alice_tip)
        );
        assert_eq!(sync.sync_state("origin", "main").unwrap(), SyncState::Diverged);
    }

    #[tokio::test]
    async fn pull_rejects_unsigned_history() {
        let hosted = Arc::new(HostedRepository::in_memory());
        let author = Client::new();
        let signed = author.commit("main", "a.txt", "1", "one");
        let tree = author.graph.get_commit(&signed).unwrap().tree;
        let unsigned = Commit::new(tree, vec![signed], author.identity_key(), 5, "forged");
        let unsigned_id = author.graph.store().put_commit(&unsigned).unwrap();
        hosted.receive(&author.all_objects()).unwrap();
        // bypass the server's own checks
        hosted.refs().write_ref("refs/heads/main", unsigned_id).unwrap();

        let clone = Client::new();
        let err = engine(&clone)
            .pull(&LocalTransport::new(hosted), "origin", "main")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::VerificationFailed { commit } if commit == unsigned_id));
        assert_eq!(clone.tip("main"), None);
        assert_eq!(
            clone.graph.refs().read_ref("refs/remotes/origin/main").unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn sync_state_transitions() {
        let client = Client::new();
        let sync = engine(&client);
        assert_eq!(sync.sync_state("origin", "main").unwrap(), SyncState::Unpublished);

        client.commit("main", "a.txt", "1", "one");
        assert_eq!(sync.sync_state("origin", "main").unwrap(), SyncState::Unpublished);

        let transport = remote();
        sync.push(&transport, "origin", "main").await.unwrap();
        assert_eq!(sync.sync_state("origin", "main").unwrap(), SyncState::Synced);
    }

    #[test]
    fn references_of_commit_and_tree() {
        let client = Client::new();
        let tip = client.commit("main", "dir/a.txt", "a", "one");
        let store = client.graph.store();
        let commit = store.get_object(&tip).unwrap();
        let refs = references(&commit).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].1, ObjectKind::Tree);

        let root = store.get_object(&refs[0].0).unwrap();
        let children = references(&root).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].1, ObjectKind::Tree);
    }
}
