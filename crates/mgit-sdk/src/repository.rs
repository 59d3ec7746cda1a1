//! The [`Repository`] facade.
//!
//! On disk a repository is a working directory with an `.mgit/` directory:
//!
//! ```text
//! .mgit/HEAD
//! .mgit/config      TOML, see RepoConfig
//! .mgit/index       JSON staging area
//! .mgit/objects/    loose objects
//! .mgit/refs/       branches and remote-tracking refs
//! ```
//!
//! Commit, checkout and the local half of pull run under one mutex per
//! repository. Push and the network half of pull run without it; the local
//! branch only moves by compare-and-swap once every object is stored.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use mgit_crypto::{NostrEvent, SigningKey};
use mgit_graph::{ChainReport, CommitGraph, SigningIdentity, StagedEntry};
use mgit_protocol::AuthMethod;
use mgit_refs::{
    branch_ref, remote_ref, validate_branch_name, validate_remote_name, BranchInfo, FsRefStore,
    InMemoryRefStore, RefStore,
};
use mgit_store::{FsObjectStore, InMemoryObjectStore, ObjectKind, ObjectStore};
use mgit_sync::{
    HttpTransport, MergeStatus, PullResult, PushResult, RemoteTransport, SyncEngine, SyncError,
    SyncState,
};
use mgit_types::{NostrPubkey, ObjectId};
use mgit_worktree::{WorkTree, WorkdirStatus, MGIT_DIR};
use tracing::{info, warn};

use crate::commit::{CommitResult, CommitSummary};
use crate::config::{RemoteConfig, RepoConfig};
use crate::error::{SdkError, SdkResult};

pub const DEFAULT_BRANCH: &str = "main";
const CONFIG_FILE: &str = "config";
const OBJECTS_DIR: &str = "objects";
const HAS_CACHE_ENTRIES: usize = 100_000;
const MIN_PREFIX_LEN: usize = 4;

struct State {
    config: RepoConfig,
    worktree: Option<WorkTree>,
}

impl State {
    fn worktree(&self) -> SdkResult<&WorkTree> {
        self.worktree.as_ref().ok_or(SdkError::NoWorkingTree)
    }

    fn worktree_mut(&mut self) -> SdkResult<&mut WorkTree> {
        self.worktree.as_mut().ok_or(SdkError::NoWorkingTree)
    }
}

/// A local MGit repository.
pub struct Repository {
    graph: CommitGraph,
    engine: SyncEngine,
    mgit_dir: Option<PathBuf>,
    state: Mutex<State>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("mgit_dir", &self.mgit_dir)
            .finish_non_exhaustive()
    }
}

impl Repository {
    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    /// Create a repository in `root`, with HEAD on an unborn `main`.
    pub fn init(root: impl AsRef<Path>) -> SdkResult<Self> {
        let root = root.as_ref();
        let dir = root.join(MGIT_DIR);
        if dir.exists() {
            return Err(SdkError::AlreadyInitialized(root.to_path_buf()));
        }
        std::fs::create_dir_all(dir.join(OBJECTS_DIR))?;
        FsRefStore::open(&dir)?.set_head(DEFAULT_BRANCH)?;
        RepoConfig::default().save(&dir.join(CONFIG_FILE))?;
        info!(path = %root.display(), "initialized repository");
        Self::open(root)
    }

    /// Open the repository whose working tree is `root`.
    pub fn open(root: impl AsRef<Path>) -> SdkResult<Self> {
        let root = root.as_ref();
        let dir = root.join(MGIT_DIR);
        if !dir.is_dir() {
            return Err(SdkError::NotInitialized(root.to_path_buf()));
        }
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::open(dir.join(OBJECTS_DIR))?);
        let refs: Arc<dyn RefStore> = Arc::new(FsRefStore::open(&dir)?);
        let config = RepoConfig::load(&dir.join(CONFIG_FILE))?;
        let worktree = WorkTree::open(root, store.clone())?;
        Ok(Self::assemble(store, refs, Some(dir), config, Some(worktree)))
    }

    /// Open the repository containing `start` or one of its ancestors.
    pub fn discover(start: impl AsRef<Path>) -> SdkResult<Self> {
        let start = start.as_ref();
        let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
        start
            .ancestors()
            .find(|dir| dir.join(MGIT_DIR).is_dir())
            .ok_or_else(|| SdkError::NotInitialized(start.clone()))
            .and_then(Self::open)
    }

    /// A repository without a working tree, held entirely in memory.
    ///
    /// Staging, status and checkout fail with `NoWorkingTree`; commit with
    /// [`Repository::commit_entries`] instead.
    pub fn in_memory() -> SdkResult<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let refs: Arc<dyn RefStore> = Arc::new(InMemoryRefStore::new());
        refs.set_head(DEFAULT_BRANCH)?;
        Ok(Self::assemble(store, refs, None, RepoConfig::default(), None))
    }

    fn assemble(
        store: Arc<dyn ObjectStore>,
        refs: Arc<dyn RefStore>,
        mgit_dir: Option<PathBuf>,
        config: RepoConfig,
        worktree: Option<WorkTree>,
    ) -> Self {
        let graph = CommitGraph::new(store, refs);
        Self {
            engine: SyncEngine::new(graph.clone()),
            graph,
            mgit_dir,
            state: Mutex::new(State { config, worktree }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("lock poisoned")
    }

    fn refs(&self) -> &dyn RefStore {
        &**self.graph.refs()
    }

    fn save_config(&self, config: &RepoConfig) -> SdkResult<()> {
        match &self.mgit_dir {
            Some(dir) => config.save(&dir.join(CONFIG_FILE)),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn graph(&self) -> &CommitGraph {
        &self.graph
    }

    /// Working tree root, `None` for in-memory repositories.
    pub fn root(&self) -> Option<PathBuf> {
        self.lock().worktree.as_ref().map(|wt| wt.root().to_path_buf())
    }

    pub fn config(&self) -> RepoConfig {
        self.lock().config.clone()
    }

    pub fn current_branch(&self) -> SdkResult<String> {
        Ok(self.refs().current_branch()?)
    }

    /// The commit HEAD resolves to, `None` on an unborn branch.
    pub fn head_commit(&self) -> SdkResult<Option<ObjectId>> {
        Ok(self.refs().resolve_head()?)
    }

    /// Require commits to be signed by `pubkey` (or lift the requirement).
    pub fn set_user(&self, pubkey: Option<NostrPubkey>) -> SdkResult<()> {
        let mut state = self.lock();
        state.config.user.pubkey = pubkey;
        self.save_config(&state.config)
    }

    // -----------------------------------------------------------------------
    // Working tree
    // -----------------------------------------------------------------------

    /// Stage a file or directory; returns the affected paths.
    pub fn stage(&self, path: impl AsRef<Path>) -> SdkResult<Vec<String>> {
        Ok(self.lock().worktree_mut()?.stage(path)?)
    }

    pub fn unstage(&self, path: impl AsRef<Path>) -> SdkResult<Vec<String>> {
        Ok(self.lock().worktree_mut()?.unstage(path)?)
    }

    /// Delete a tracked file and stage the deletion.
    pub fn remove(&self, path: impl AsRef<Path>) -> SdkResult<Vec<String>> {
        Ok(self.lock().worktree_mut()?.remove(path)?)
    }

    pub fn status(&self) -> SdkResult<WorkdirStatus> {
        Ok(self.lock().worktree()?.status()?)
    }

    // -----------------------------------------------------------------------
    // Commits
    // -----------------------------------------------------------------------

    /// Commit the index on the current branch.
    pub fn commit(&self, identity: &dyn SigningIdentity, message: &str) -> SdkResult<CommitResult> {
        let mut state = self.lock();
        check_identity(&state.config, identity.public_key())?;
        let worktree = state.worktree_mut()?;
        let entries = worktree.staged_entries();
        let result = self.commit_locked(identity, &entries, message)?;
        worktree.mark_committed(result.tree)?;
        Ok(result)
    }

    /// Commit an explicit set of entries, bypassing the working tree.
    pub fn commit_entries(
        &self,
        identity: &dyn SigningIdentity,
        entries: &[StagedEntry],
        message: &str,
    ) -> SdkResult<CommitResult> {
        let state = self.lock();
        check_identity(&state.config, identity.public_key())?;
        self.commit_locked(identity, entries, message)
    }

    fn commit_locked(
        &self,
        identity: &dyn SigningIdentity,
        entries: &[StagedEntry],
        message: &str,
    ) -> SdkResult<CommitResult> {
        let branch = self.refs().current_branch()?;
        let tip = self.refs().read_ref(&branch_ref(&branch))?;
        let tree = self.graph.build_tree(entries)?;
        if let Some(tip) = tip {
            if self.graph.get_commit(&tip)?.tree == tree {
                return Err(SdkError::NothingToCommit);
            }
        }
        let parents: Vec<ObjectId> = tip.into_iter().collect();
        let id = self.graph.commit_on(
            &branch,
            tree,
            &parents,
            identity,
            message,
            chrono::Utc::now().timestamp(),
        )?;
        Ok(CommitResult {
            id,
            tree,
            parents,
            branch,
        })
    }

    /// First-parent history from HEAD, newest first.
    pub fn log(&self, limit: Option<usize>) -> SdkResult<Vec<CommitSummary>> {
        match self.head_commit()? {
            Some(tip) => self.log_from(tip, limit),
            None => Ok(Vec::new()),
        }
    }

    pub fn log_from(&self, from: ObjectId, limit: Option<usize>) -> SdkResult<Vec<CommitSummary>> {
        self.graph
            .log(from)
            .take(limit.unwrap_or(usize::MAX))
            .map(|entry| {
                let (id, commit) = entry?;
                Ok(CommitSummary::new(id, &commit))
            })
            .collect()
    }

    /// Verify every signature reachable from HEAD. An unborn branch is
    /// trivially valid.
    pub fn verify_chain(&self) -> SdkResult<ChainReport> {
        match self.head_commit()? {
            Some(tip) => Ok(self.graph.verify_chain(&tip)?),
            None => Ok(ChainReport {
                valid: true,
                first_invalid: None,
                failure: None,
                checked: 0,
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Branches and checkout
    // -----------------------------------------------------------------------

    pub fn branches(&self) -> SdkResult<Vec<BranchInfo>> {
        Ok(self.refs().branches()?)
    }

    /// Create `name` at the HEAD commit without switching to it.
    pub fn create_branch(&self, name: &str) -> SdkResult<ObjectId> {
        validate_branch_name(name)?;
        let _state = self.lock();
        let tip = self
            .head_commit()?
            .ok_or_else(|| SdkError::BranchNotFound(self.current_branch().unwrap_or_default()))?;
        self.refs().compare_and_swap(&branch_ref(name), None, tip)?;
        Ok(tip)
    }

    /// Resolve a branch name, a full commit id, or an unambiguous id prefix.
    pub fn resolve_revision(&self, rev: &str) -> SdkResult<ObjectId> {
        if validate_branch_name(rev).is_ok() {
            if let Some(id) = self.refs().read_ref(&branch_ref(rev))? {
                return Ok(id);
            }
        }
        let unknown = || SdkError::UnknownRevision(rev.to_string());
        if let Ok(id) = ObjectId::from_hex(rev) {
            self.graph.get_commit(&id).map_err(|_| unknown())?;
            return Ok(id);
        }
        let prefix = rev.to_ascii_lowercase();
        if prefix.len() < MIN_PREFIX_LEN || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(unknown());
        }
        let store = self.graph.store();
        let mut matches = store
            .object_ids()?
            .into_iter()
            .filter(|id| id.to_hex().starts_with(&prefix))
            .filter(|id| {
                store
                    .get_object(id)
                    .map(|o| o.kind == ObjectKind::Commit)
                    .unwrap_or(false)
            });
        match (matches.next(), matches.next()) {
            (Some(id), None) => Ok(id),
            _ => Err(unknown()),
        }
    }

    /// Check out a branch (HEAD follows it) or a commit (HEAD detaches).
    ///
    /// Fails with `DirtyWorkingTree` on uncommitted changes unless `force`.
    pub fn checkout(&self, rev: &str, force: bool) -> SdkResult<ObjectId> {
        let mut state = self.lock();
        let branch = validate_branch_name(rev)
            .ok()
            .and_then(|_| self.refs().read_ref(&branch_ref(rev)).ok().flatten())
            .map(|_| rev.to_string());
        let commit = self.resolve_revision(rev)?;
        let tree = self.graph.get_commit(&commit)?.tree;
        state.worktree_mut()?.checkout_tree(&tree, force)?;
        match &branch {
            Some(name) => self.refs().set_head(name)?,
            None => self.refs().set_head_detached(commit)?,
        }
        info!(rev, commit = %commit.short_hex(), detached = branch.is_none(), "checked out");
        Ok(commit)
    }

    // -----------------------------------------------------------------------
    // Remotes
    // -----------------------------------------------------------------------

    pub fn add_remote(&self, name: &str, url: &str) -> SdkResult<()> {
        validate_remote_name(name)?;
        HttpTransport::from_remote_url(url, AuthMethod::Anonymous)?;
        let mut state = self.lock();
        if state.config.remotes.contains_key(name) {
            return Err(SdkError::RemoteExists(name.to_string()));
        }
        state
            .config
            .remotes
            .insert(name.to_string(), RemoteConfig { url: url.to_string() });
        self.save_config(&state.config)
    }

    /// Forget a remote and its remote-tracking refs.
    pub fn remove_remote(&self, name: &str) -> SdkResult<()> {
        let mut state = self.lock();
        if state.config.remotes.remove(name).is_none() {
            return Err(SdkError::RemoteNotFound(name.to_string()));
        }
        self.save_config(&state.config)?;
        for (tracking, _) in self.refs().list_refs(&format!("refs/remotes/{name}/"))? {
            self.refs().delete_ref(&tracking)?;
        }
        Ok(())
    }

    /// `(name, url)` pairs, sorted by name.
    pub fn remotes(&self) -> Vec<(String, String)> {
        self.lock()
            .config
            .remotes
            .iter()
            .map(|(name, r)| (name.clone(), r.url.clone()))
            .collect()
    }

    /// HTTP transport for a configured remote.
    pub fn transport(&self, remote: &str, token: Option<String>) -> SdkResult<HttpTransport> {
        let state = self.lock();
        let url = state.config.remote_url(remote)?;
        let sync = &state.config.sync;
        Ok(HttpTransport::from_remote_url(url, AuthMethod::from_token(token))?
            .with_retry(sync.retry_policy())
            .with_has_cache(sync.has_cache_ttl()?, HAS_CACHE_ENTRIES))
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    /// Push the current branch to a configured remote.
    pub async fn push(&self, remote: &str, token: Option<String>) -> SdkResult<PushResult> {
        let transport = self.transport(remote, token)?;
        self.push_with(&transport, remote).await
    }

    pub async fn push_with(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
    ) -> SdkResult<PushResult> {
        let branch = self.current_branch()?;
        Ok(self.engine.push(transport, remote, &branch).await?)
    }

    /// Pull the current branch from a configured remote.
    pub async fn pull(&self, remote: &str, token: Option<String>) -> SdkResult<PullResult> {
        let transport = self.transport(remote, token)?;
        self.pull_with(&transport, remote).await
    }

    /// Fetch without the repository lock, then fast-forward the branch and
    /// the working tree under it. Diverged histories fail with
    /// `MergeRequired` and leave both untouched.
    pub async fn pull_with(
        &self,
        transport: &dyn RemoteTransport,
        remote: &str,
    ) -> SdkResult<PullResult> {
        let branch = self.current_branch()?;
        let fetched = self.engine.fetch(transport, remote, &branch).await?;
        let merge_status = match fetched.remote_tip {
            Some(tip) => self.fast_forward(&branch, tip)?,
            None => MergeStatus::UpToDate,
        };
        info!(remote, branch = %branch, new_objects = fetched.new_objects, ?merge_status, "pulled");
        Ok(PullResult {
            new_objects: fetched.new_objects,
            new_remote_ref: fetched.remote_tip,
            merge_status,
        })
    }

    fn fast_forward(&self, branch: &str, tip: ObjectId) -> SdkResult<MergeStatus> {
        let mut state = self.lock();
        let local = self.refs().read_ref(&branch_ref(branch))?;
        match local {
            Some(l) if l == tip || self.graph.is_ancestor(&tip, &l)? => {
                return Ok(MergeStatus::UpToDate)
            }
            Some(l) if !self.graph.is_ancestor(&l, &tip)? => {
                return Err(SyncError::MergeRequired {
                    branch: branch.to_string(),
                    local: l,
                    remote: tip,
                }
                .into())
            }
            _ => {}
        }

        let on_branch = self.refs().current_branch().ok().as_deref() == Some(branch);
        let worktree = state.worktree.as_mut().filter(|_| on_branch);
        if let Some(worktree) = worktree {
            let tree = self.graph.get_commit(&tip)?.tree;
            worktree.checkout_tree(&tree, false)?;
            if let Err(e) = self.engine.fast_forward(branch, tip) {
                if let Some(old) = local {
                    let old_tree = self.graph.get_commit(&old)?.tree;
                    if let Err(restore) = worktree.checkout_tree(&old_tree, true) {
                        warn!(error = %restore, "could not restore working tree after failed pull");
                    }
                }
                return Err(e.into());
            }
            return Ok(MergeStatus::FastForward {
                from: local,
                to: tip,
            });
        }
        Ok(self.engine.fast_forward(branch, tip)?)
    }

    /// Local branch compared with its remote-tracking ref. No network.
    pub fn sync_state(&self, remote: &str) -> SdkResult<SyncState> {
        let branch = self.current_branch()?;
        Ok(self.engine.sync_state(remote, &branch)?)
    }

    /// A signed repository-state event for the current branches, ready to
    /// publish to relays.
    pub fn announce(&self, key: &SigningKey, repo_id: &str) -> SdkResult<NostrEvent> {
        check_identity(&self.lock().config, key.public_key())?;
        let branch = self.current_branch()?;
        let refs = self.refs().list_refs("refs/heads/")?;
        Ok(NostrEvent::repo_state(key, repo_id, &branch, &refs)?)
    }

    /// Remote-tracking ref for the current branch.
    pub fn tracking_ref(&self, remote: &str) -> SdkResult<Option<ObjectId>> {
        let branch = self.current_branch()?;
        Ok(self.refs().read_ref(&remote_ref(remote, &branch))?)
    }
}

fn check_identity(config: &RepoConfig, actual: NostrPubkey) -> SdkResult<()> {
    match config.user.pubkey {
        Some(expected) if expected != actual => Err(SdkError::IdentityMismatch { expected, actual }),
        _ => Ok(()),
    }
}
