//! Filesystem side of the working tree.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use mgit_graph::{read_tree_recursive, StagedEntry, TrackedFile};
use mgit_store::fs::write_atomic;
use mgit_store::{EntryMode, ObjectKind, ObjectStore, StoredObject};
use mgit_types::ObjectId;

use crate::entry::IndexEntry;
use crate::error::{WorktreeError, WorktreeResult};
use crate::index::Index;
use crate::status::WorkdirStatus;

/// Per-directory ignore file, gitignore syntax.
pub const IGNORE_FILE: &str = ".mgitignore";

/// Repository metadata directory at the root of every working tree.
pub const MGIT_DIR: &str = ".mgit";

const INDEX_FILE: &str = "index";

/// A working directory paired with its index and object store.
///
/// All mutating operations take `&mut self`; callers sharing a `WorkTree`
/// between threads hold it behind a mutex.
pub struct WorkTree {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
    index: Index,
}

impl std::fmt::Debug for WorkTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkTree")
            .field("root", &self.root)
            .field("entries", &self.index.len())
            .finish()
    }
}

impl WorkTree {
    /// Open the working tree rooted at `root`, loading `.mgit/index` if present.
    pub fn open(root: impl AsRef<Path>, store: Arc<dyn ObjectStore>) -> WorktreeResult<Self> {
        let root = root.as_ref();
        let root = root.canonicalize().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WorktreeError::NoSuchFile(root.to_path_buf()),
            _ => WorktreeError::Io(e),
        })?;
        let index = Index::load(&root.join(MGIT_DIR).join(INDEX_FILE))?;
        tracing::debug!(root = %root.display(), entries = index.len(), "opened working tree");
        Ok(Self { root, store, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Index contents as input for [`mgit_graph::build_tree`].
    pub fn staged_entries(&self) -> Vec<StagedEntry> {
        self.index.staged_entries()
    }

    /// Stage a file or directory.
    ///
    /// File content is written to the object store immediately. A directory
    /// stages every non-ignored file under it. Tracked files that no longer
    /// exist on disk are dropped from the index. Returns the affected paths.
    pub fn stage(&mut self, path: impl AsRef<Path>) -> WorktreeResult<Vec<String>> {
        let rel = self.relative_path(path.as_ref())?;
        let abs = self.absolute(&rel);
        let affected = match fs::symlink_metadata(&abs) {
            Ok(meta) if meta.is_dir() => self.stage_dir(&rel)?,
            Ok(meta) => {
                self.stage_file(&rel, &abs, &meta)?;
                vec![rel]
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let gone = self.tracked_under(&rel);
                if gone.is_empty() {
                    return Err(WorktreeError::NoSuchFile(abs));
                }
                for path in &gone {
                    self.index.entries.remove(path);
                }
                gone
            }
            Err(e) => return Err(e.into()),
        };
        self.save_index()?;
        tracing::debug!(paths = affected.len(), "staged");
        Ok(affected)
    }

    /// Revert the index entries under `path` to the last committed tree.
    pub fn unstage(&mut self, path: impl AsRef<Path>) -> WorktreeResult<Vec<String>> {
        let rel = self.relative_path(path.as_ref())?;
        let base = self.base_files()?;
        let mut candidates: BTreeSet<String> = self.tracked_under(&rel).into_iter().collect();
        candidates.extend(base.keys().filter(|p| is_under(p, &rel)).cloned());
        if candidates.is_empty() {
            return Err(WorktreeError::NotTracked(rel));
        }

        let mut changed = Vec::new();
        for path in candidates {
            match base.get(&path) {
                Some(file) => {
                    let unchanged = self
                        .index
                        .get(&path)
                        .is_some_and(|e| e.object_id == file.blob && e.mode == file.mode);
                    if !unchanged {
                        let size = self.store.get_blob(&file.blob)?.data.len() as u64;
                        self.index
                            .insert(IndexEntry::new(path.clone(), file.blob, file.mode, size));
                        changed.push(path);
                    }
                }
                None => {
                    if self.index.entries.remove(&path).is_some() {
                        changed.push(path);
                    }
                }
            }
        }
        self.save_index()?;
        Ok(changed)
    }

    /// Stop tracking the files under `path` and delete them from disk.
    pub fn remove(&mut self, path: impl AsRef<Path>) -> WorktreeResult<Vec<String>> {
        let rel = self.relative_path(path.as_ref())?;
        let tracked = self.tracked_under(&rel);
        if tracked.is_empty() {
            return Err(WorktreeError::NotTracked(rel));
        }
        for path in &tracked {
            self.index.remove(path)?;
            self.delete_file(path)?;
        }
        self.save_index()?;
        Ok(tracked)
    }

    /// Compare the index with the last commit and with the disk.
    pub fn status(&self) -> WorktreeResult<WorkdirStatus> {
        let base = self.base_files()?;
        let mut status = WorkdirStatus::new();
        status.staged = self.index.changes_against(&base);

        for (path, entry) in &self.index.entries {
            let abs = self.absolute(path);
            match fs::symlink_metadata(&abs) {
                Ok(meta) if meta.is_file() => {
                    let changed = meta.len() != entry.size
                        || file_mode(&meta) != entry.mode
                        || blob_id(fs::read(&abs)?) != entry.object_id;
                    if changed {
                        status.modified.push(path.clone());
                    }
                }
                Ok(_) => status.modified.push(path.clone()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => status.deleted.push(path.clone()),
                Err(e) => return Err(e.into()),
            }
        }

        status.untracked = self
            .walk_files()?
            .into_iter()
            .filter(|p| self.index.get(p).is_none())
            .collect();
        Ok(status)
    }

    /// Make the working directory and index match `tree`.
    ///
    /// Unless `force` is set, fails with `DirtyWorkingTree` when staged or
    /// unstaged changes exist, or when an untracked file would be
    /// overwritten. Every blob is read and every write target checked
    /// before the disk is touched: a directory holding untracked files
    /// where a file must go, or a file where a directory must go, fails
    /// even with `force`. Tracked files missing from `tree` are deleted;
    /// untracked files are left alone.
    pub fn checkout_tree(&mut self, tree: &ObjectId, force: bool) -> WorktreeResult<()> {
        let target = read_tree_recursive(self.store.as_ref(), tree)?;

        if !force {
            let status = self.status()?;
            let mut blocked = status.dirty_paths();
            blocked.extend(
                status
                    .untracked
                    .into_iter()
                    .filter(|p| target.contains_key(p)),
            );
            if !blocked.is_empty() {
                blocked.sort();
                return Err(WorktreeError::DirtyWorkingTree(blocked));
            }
        }

        let mut sizes = BTreeMap::new();
        let mut writes = Vec::new();
        for (path, file) in &target {
            let current = self.index.get(path);
            if let Some(entry) = current.filter(|e| !force && e.object_id == file.blob && e.mode == file.mode) {
                sizes.insert(path.clone(), entry.size);
                continue;
            }
            let blob = self.store.get_blob(&file.blob)?;
            sizes.insert(path.clone(), blob.data.len() as u64);
            writes.push((path, file.mode, blob.data));
        }

        let stale: BTreeSet<String> = self
            .index
            .entries
            .keys()
            .filter(|p| !target.contains_key(*p))
            .cloned()
            .collect();
        let mut obstructed = Vec::new();
        for (path, _, _) in &writes {
            if let Some(at) = self.obstruction(path, &stale)? {
                obstructed.push(at);
            }
        }
        if !obstructed.is_empty() {
            obstructed.sort();
            obstructed.dedup();
            return Err(WorktreeError::DirtyWorkingTree(obstructed));
        }

        for path in &stale {
            self.delete_file(path)?;
        }

        let written = writes.len();
        for (path, mode, data) in writes {
            let abs = self.absolute(path);
            if let Some(parent) = abs.parent() {
                fs::create_dir_all(parent)?;
            }
            write_atomic(&abs, &data)?;
            set_file_mode(&abs, mode)?;
        }

        self.index = Index::from_tree(*tree, &target, &sizes);
        self.save_index()?;
        tracing::info!(
            tree = %tree.short_hex(),
            written,
            removed = stale.len(),
            "checked out tree"
        );
        Ok(())
    }

    /// Record that the current index was committed as `tree`.
    pub fn mark_committed(&mut self, tree: ObjectId) -> WorktreeResult<()> {
        self.index.base_tree = Some(tree);
        self.save_index()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn index_path(&self) -> PathBuf {
        self.root.join(MGIT_DIR).join(INDEX_FILE)
    }

    fn save_index(&self) -> WorktreeResult<()> {
        self.index.save(&self.index_path())
    }

    fn absolute(&self, rel: &str) -> PathBuf {
        rel.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, s| acc.join(s))
    }

    fn base_files(&self) -> WorktreeResult<BTreeMap<String, TrackedFile>> {
        match &self.index.base_tree {
            Some(tree) => Ok(read_tree_recursive(self.store.as_ref(), tree)?),
            None => Ok(BTreeMap::new()),
        }
    }

    fn tracked_under(&self, prefix: &str) -> Vec<String> {
        self.index
            .entries
            .keys()
            .filter(|p| is_under(p, prefix))
            .cloned()
            .collect()
    }

    /// Resolve a user-supplied path to a slash-separated path relative to
    /// the root. The final component is not followed if it is a symlink.
    fn relative_path(&self, path: &Path) -> WorktreeResult<String> {
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = match (abs.parent(), abs.file_name()) {
            (Some(parent), Some(name)) => match parent.canonicalize() {
                Ok(parent) => parent.join(name),
                Err(e) if e.kind() == io::ErrorKind::NotFound => normalize(&abs),
                Err(e) => return Err(e.into()),
            },
            _ => normalize(&abs),
        };
        let rel = resolved
            .strip_prefix(&self.root)
            .map_err(|_| WorktreeError::OutsideWorktree(path.to_path_buf()))?;

        let mut segments = Vec::new();
        for component in rel.components() {
            let Component::Normal(segment) = component else {
                return Err(WorktreeError::OutsideWorktree(path.to_path_buf()));
            };
            let segment = segment.to_str().ok_or_else(|| WorktreeError::UnsupportedEntry {
                path: rel.display().to_string(),
                reason: "path is not valid UTF-8".into(),
            })?;
            segments.push(segment);
        }
        if segments.first() == Some(&MGIT_DIR) {
            return Err(WorktreeError::OutsideWorktree(path.to_path_buf()));
        }
        Ok(segments.join("/"))
    }

    fn stage_file(&mut self, rel: &str, abs: &Path, meta: &Metadata) -> WorktreeResult<()> {
        if meta.file_type().is_symlink() {
            return Err(WorktreeError::UnsupportedEntry {
                path: rel.to_string(),
                reason: "symbolic links cannot be tracked".into(),
            });
        }
        if !meta.is_file() {
            return Err(WorktreeError::UnsupportedEntry {
                path: rel.to_string(),
                reason: "not a regular file".into(),
            });
        }
        let data = fs::read(abs)?;
        let id = self.store.put_blob(&data)?;
        self.index.insert(IndexEntry::new(
            rel,
            id,
            file_mode(meta),
            data.len() as u64,
        ));
        Ok(())
    }

    fn stage_dir(&mut self, prefix: &str) -> WorktreeResult<Vec<String>> {
        let on_disk: Vec<String> = self
            .walk_files()?
            .into_iter()
            .filter(|p| is_under(p, prefix))
            .collect();
        for path in &on_disk {
            let abs = self.absolute(path);
            let meta = fs::symlink_metadata(&abs)?;
            self.stage_file(path, &abs, &meta)?;
        }

        let present: BTreeSet<&String> = on_disk.iter().collect();
        let mut affected = on_disk.clone();
        for path in self.tracked_under(prefix) {
            if !present.contains(&path) && !self.absolute(&path).exists() {
                self.index.entries.remove(&path);
                affected.push(path);
            }
        }
        affected.sort();
        Ok(affected)
    }

    /// Every non-directory entry under the root, minus `.mgit` and ignored paths.
    fn walk_files(&self) -> WorktreeResult<Vec<String>> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .parents(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .require_git(false)
            .add_custom_ignore_filename(IGNORE_FILE)
            .filter_entry(|entry| !(entry.depth() == 1 && entry.file_name() == MGIT_DIR))
            .build();

        let mut files = Vec::new();
        for result in walker {
            let entry = result.map_err(|e| WorktreeError::Walk(e.to_string()))?;
            if entry.file_type().map_or(true, |t| t.is_dir()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            match rel.to_str() {
                Some(rel) => files.push(rel.replace(std::path::MAIN_SEPARATOR, "/")),
                None => tracing::warn!(path = %rel.display(), "skipping non UTF-8 path"),
            }
        }
        files.sort();
        Ok(files)
    }

    /// The path blocking a write to `rel`, if any. Tracked files in
    /// `stale` are about to be deleted and never block.
    fn obstruction(&self, rel: &str, stale: &BTreeSet<String>) -> WorktreeResult<Option<String>> {
        let mut prefix = String::new();
        let mut parts = rel.split('/').peekable();
        while let Some(part) = parts.next() {
            if parts.peek().is_none() {
                break;
            }
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            match fs::symlink_metadata(self.absolute(&prefix)) {
                Ok(meta) if !meta.is_dir() && !stale.contains(&prefix) => {
                    return Ok(Some(prefix));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        let abs = self.absolute(rel);
        match fs::symlink_metadata(&abs) {
            Ok(meta) if meta.is_dir() && !self.only_stale_below(&abs, rel, stale)? => {
                Ok(Some(rel.to_string()))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// True when every file below `dir` is a tracked file in `stale`, so
    /// deleting them prunes the directory away.
    fn only_stale_below(&self, dir: &Path, rel: &str, stale: &BTreeSet<String>) -> WorktreeResult<bool> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let child = format!("{rel}/{}", name.to_string_lossy());
            let clear = if entry.file_type()?.is_dir() {
                self.only_stale_below(&entry.path(), &child, stale)?
            } else {
                stale.contains(&child)
            };
            if !clear {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn delete_file(&self, rel: &str) -> WorktreeResult<()> {
        let abs = self.absolute(rel);
        match fs::remove_file(&abs) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.prune_empty_dirs(&abs);
        Ok(())
    }

    fn prune_empty_dirs(&self, removed: &Path) {
        let mut dir = removed.parent();
        while let Some(d) = dir {
            if d == self.root || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
}

fn is_under(path: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn blob_id(data: Vec<u8>) -> ObjectId {
    StoredObject::new(ObjectKind::Blob, data).compute_id()
}

#[cfg(unix)]
fn file_mode(meta: &Metadata) -> EntryMode {
    use std::os::unix::fs::PermissionsExt;
    if meta.permissions().mode() & 0o111 != 0 {
        EntryMode::Executable
    } else {
        EntryMode::Regular
    }
}

#[cfg(not(unix))]
fn file_mode(_meta: &Metadata) -> EntryMode {
    EntryMode::Regular
}

#[cfg(unix)]
fn set_file_mode(path: &Path, mode: EntryMode) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let bits = match mode {
        EntryMode::Executable => 0o755,
        _ => 0o644,
    };
    fs::set_permissions(path, fs::Permissions::from_mode(bits))
}

#[cfg(not(unix))]
fn set_file_mode(_path: &Path, _mode: EntryMode) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{FileStatus, StatusEntry};
    use mgit_graph::build_tree;
    use mgit_store::InMemoryObjectStore;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<dyn ObjectStore>, WorkTree) {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join(MGIT_DIR)).unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());
        let wt = WorkTree::open(temp.path(), store.clone()).unwrap();
        (temp, store, wt)
    }

    fn write(temp: &TempDir, rel: &str, content: &str) {
        let path = temp.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn commit(store: &Arc<dyn ObjectStore>, wt: &mut WorkTree) -> ObjectId {
        let tree = build_tree(store.as_ref(), &wt.staged_entries()).unwrap();
        wt.mark_committed(tree).unwrap();
        tree
    }

    // -----------------------------------------------------------------------
    // stage / unstage / remove
    // -----------------------------------------------------------------------

    #[test]
    fn stage_file_stores_blob() {
        let (temp, store, mut wt) = setup();
        write(&temp, "records/labs.json", "{}");

        let staged = wt.stage("records/labs.json").unwrap();
        assert_eq!(staged, vec!["records/labs.json"]);
        let entry = wt.index().get("records/labs.json").unwrap();
        assert_eq!(store.get_blob(&entry.object_id).unwrap().data, b"{}");
        assert_eq!(entry.size, 2);
    }

    #[test]
    fn stage_absolute_path_inside_root() {
        let (temp, _store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        let abs = temp.path().join("a.txt");
        assert_eq!(wt.stage(&abs).unwrap(), vec!["a.txt"]);
    }

    #[test]
    fn stage_directory_respects_ignore_file() {
        let (temp, _store, mut wt) = setup();
        write(&temp, "notes/a.md", "a");
        write(&temp, "notes/b.tmp", "b");
        write(&temp, IGNORE_FILE, "*.tmp\n");

        wt.stage(".").unwrap();
        let paths: Vec<&String> = wt.index().entries.keys().collect();
        assert_eq!(paths, vec![IGNORE_FILE, "notes/a.md"]);
    }

    #[test]
    fn stage_outside_root_is_rejected() {
        let (temp, _store, mut wt) = setup();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("x"), "x").unwrap();

        assert!(matches!(
            wt.stage(outside.path().join("x")),
            Err(WorktreeError::OutsideWorktree(_))
        ));
        assert!(matches!(
            wt.stage("../escape"),
            Err(WorktreeError::OutsideWorktree(_))
        ));
        write(&temp, ".mgit/config", "x");
        assert!(matches!(
            wt.stage(".mgit/config"),
            Err(WorktreeError::OutsideWorktree(_))
        ));
    }

    #[test]
    fn stage_missing_untracked_file_fails() {
        let (_temp, _store, mut wt) = setup();
        assert!(matches!(
            wt.stage("nope.txt"),
            Err(WorktreeError::NoSuchFile(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn stage_symlink_is_unsupported() {
        let (temp, _store, mut wt) = setup();
        write(&temp, "target.txt", "t");
        std::os::unix::fs::symlink(temp.path().join("target.txt"), temp.path().join("link"))
            .unwrap();
        assert!(matches!(
            wt.stage("link"),
            Err(WorktreeError::UnsupportedEntry { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn stage_detects_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let (temp, _store, mut wt) = setup();
        write(&temp, "run.sh", "#!/bin/sh");
        fs::set_permissions(temp.path().join("run.sh"), fs::Permissions::from_mode(0o755))
            .unwrap();
        wt.stage("run.sh").unwrap();
        assert_eq!(wt.index().get("run.sh").unwrap().mode, EntryMode::Executable);
    }

    #[test]
    fn staging_a_deleted_file_drops_it() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        wt.stage("a.txt").unwrap();
        commit(&store, &mut wt);

        fs::remove_file(temp.path().join("a.txt")).unwrap();
        wt.stage("a.txt").unwrap();
        assert!(wt.index().is_empty());
        let status = wt.status().unwrap();
        assert_eq!(status.staged, vec![StatusEntry::new("a.txt", FileStatus::Deleted)]);
    }

    #[test]
    fn unstage_restores_committed_version() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "v1");
        wt.stage("a.txt").unwrap();
        commit(&store, &mut wt);

        write(&temp, "a.txt", "v2");
        write(&temp, "new.txt", "n");
        wt.stage(".").unwrap();
        assert_eq!(wt.status().unwrap().staged.len(), 2);

        wt.unstage(".").unwrap();
        let status = wt.status().unwrap();
        assert!(status.staged.is_empty());
        assert_eq!(status.modified, vec!["a.txt"]);
        assert_eq!(status.untracked, vec!["new.txt"]);
    }

    #[test]
    fn unstage_unknown_path_fails() {
        let (_temp, _store, mut wt) = setup();
        assert!(matches!(
            wt.unstage("ghost"),
            Err(WorktreeError::NotTracked(_))
        ));
    }

    #[test]
    fn remove_deletes_file_and_entry() {
        let (temp, _store, mut wt) = setup();
        write(&temp, "dir/a.txt", "a");
        wt.stage("dir/a.txt").unwrap();

        assert_eq!(wt.remove("dir").unwrap(), vec!["dir/a.txt"]);
        assert!(wt.index().is_empty());
        assert!(!temp.path().join("dir").exists());
        assert!(matches!(
            wt.remove("dir/a.txt"),
            Err(WorktreeError::NotTracked(_))
        ));
    }

    // -----------------------------------------------------------------------
    // status
    // -----------------------------------------------------------------------

    #[test]
    fn status_reports_every_category() {
        let (temp, store, mut wt) = setup();
        write(&temp, "keep.txt", "k");
        write(&temp, "edit.txt", "e1");
        write(&temp, "drop.txt", "d");
        wt.stage(".").unwrap();
        commit(&store, &mut wt);
        assert!(wt.status().unwrap().is_clean());

        write(&temp, "edit.txt", "e2");
        fs::remove_file(temp.path().join("drop.txt")).unwrap();
        write(&temp, "fresh.txt", "f");

        let status = wt.status().unwrap();
        assert!(status.staged.is_empty());
        assert_eq!(status.modified, vec!["edit.txt"]);
        assert_eq!(status.deleted, vec!["drop.txt"]);
        assert_eq!(status.untracked, vec!["fresh.txt"]);
    }

    #[test]
    fn status_ignores_metadata_directory() {
        let (temp, _store, wt) = setup();
        write(&temp, ".mgit/objects/ab/cd", "x");
        assert!(wt.status().unwrap().untracked.is_empty());
    }

    #[test]
    fn index_survives_reopen() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        wt.stage("a.txt").unwrap();
        let tree = commit(&store, &mut wt);

        let reopened = WorkTree::open(temp.path(), store).unwrap();
        assert_eq!(reopened.index().base_tree, Some(tree));
        assert!(reopened.index().get("a.txt").is_some());
    }

    // -----------------------------------------------------------------------
    // checkout
    // -----------------------------------------------------------------------

    #[test]
    fn checkout_switches_between_trees() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "one");
        write(&temp, "old/b.txt", "b");
        wt.stage(".").unwrap();
        let first = commit(&store, &mut wt);

        wt.remove("old").unwrap();
        write(&temp, "a.txt", "two");
        write(&temp, "new/c.txt", "c");
        wt.stage(".").unwrap();
        let second = commit(&store, &mut wt);

        wt.checkout_tree(&first, false).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "one");
        assert!(temp.path().join("old/b.txt").exists());
        assert!(!temp.path().join("new").exists());
        assert!(wt.status().unwrap().is_clean());

        wt.checkout_tree(&second, false).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "two");
        assert!(!temp.path().join("old").exists());
        assert!(wt.status().unwrap().is_clean());
    }

    #[test]
    fn checkout_refuses_dirty_tree() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "one");
        wt.stage("a.txt").unwrap();
        let first = commit(&store, &mut wt);

        write(&temp, "a.txt", "local edit");
        let err = wt.checkout_tree(&first, false).unwrap_err();
        assert!(matches!(err, WorktreeError::DirtyWorkingTree(ref p) if p == &vec!["a.txt".to_string()]));
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).unwrap(),
            "local edit"
        );

        wt.checkout_tree(&first, true).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("a.txt")).unwrap(), "one");
    }

    #[test]
    fn checkout_refuses_to_overwrite_untracked_file() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        write(&temp, "b.txt", "b");
        wt.stage(".").unwrap();
        let both = commit(&store, &mut wt);

        wt.remove("b.txt").unwrap();
        commit(&store, &mut wt);
        write(&temp, "b.txt", "someone else's");

        assert!(matches!(
            wt.checkout_tree(&both, false),
            Err(WorktreeError::DirtyWorkingTree(_))
        ));
    }

    #[test]
    fn checkout_refuses_untracked_directory_where_file_goes() {
        let (temp, store, mut wt) = setup();
        write(&temp, "b.txt", "b");
        wt.stage("b.txt").unwrap();
        let first = commit(&store, &mut wt);

        wt.remove("b.txt").unwrap();
        write(&temp, "a", "file a");
        wt.stage("a").unwrap();
        let target = commit(&store, &mut wt);

        wt.checkout_tree(&first, false).unwrap();
        write(&temp, "a/x", "untracked");

        for force in [false, true] {
            let err = wt.checkout_tree(&target, force).unwrap_err();
            assert!(matches!(err, WorktreeError::DirtyWorkingTree(ref p) if p == &vec!["a".to_string()]));
            assert_eq!(fs::read_to_string(temp.path().join("b.txt")).unwrap(), "b");
            assert_eq!(fs::read_to_string(temp.path().join("a/x")).unwrap(), "untracked");
            assert!(wt.index().get("b.txt").is_some());
            assert!(wt.index().get("a").is_none());
        }
    }

    #[test]
    fn checkout_refuses_untracked_file_where_directory_goes() {
        let (temp, store, mut wt) = setup();
        write(&temp, "d/x.txt", "x");
        wt.stage("d").unwrap();
        let target = commit(&store, &mut wt);

        wt.remove("d").unwrap();
        write(&temp, "c.txt", "c");
        wt.stage("c.txt").unwrap();
        commit(&store, &mut wt);
        write(&temp, "d", "untracked");

        let err = wt.checkout_tree(&target, false).unwrap_err();
        assert!(matches!(err, WorktreeError::DirtyWorkingTree(ref p) if p == &vec!["d".to_string()]));
        assert!(temp.path().join("c.txt").exists());
        assert_eq!(fs::read_to_string(temp.path().join("d")).unwrap(), "untracked");
    }

    #[test]
    fn checkout_replaces_tracked_directory_with_file() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a/x", "nested");
        wt.stage("a").unwrap();
        let nested = commit(&store, &mut wt);

        wt.remove("a").unwrap();
        write(&temp, "a", "flat");
        wt.stage("a").unwrap();
        let flat = commit(&store, &mut wt);

        wt.checkout_tree(&nested, false).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("a/x")).unwrap(), "nested");
        wt.checkout_tree(&flat, false).unwrap();
        assert_eq!(fs::read_to_string(temp.path().join("a")).unwrap(), "flat");
        assert!(wt.status().unwrap().is_clean());
    }

    #[test]
    fn checkout_leaves_unrelated_untracked_files() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        wt.stage("a.txt").unwrap();
        let tree = commit(&store, &mut wt);
        write(&temp, "scratch.txt", "s");

        wt.checkout_tree(&tree, false).unwrap();
        assert!(temp.path().join("scratch.txt").exists());
    }

    #[test]
    fn checkout_with_missing_blob_leaves_disk_untouched() {
        let (temp, store, mut wt) = setup();
        write(&temp, "a.txt", "a");
        wt.stage("a.txt").unwrap();
        commit(&store, &mut wt);

        let missing = ObjectId::from_bytes(b"never stored");
        let tree = store
            .put_tree(&mgit_store::Tree::new(vec![mgit_store::TreeEntry::new(
                EntryMode::Regular,
                "b.txt",
                missing,
            )]))
            .unwrap();
        assert!(matches!(
            wt.checkout_tree(&tree, true),
            Err(WorktreeError::Store(_))
        ));
        assert!(temp.path().join("a.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn checkout_restores_executable_bit() {
        use std::os::unix::fs::PermissionsExt;
        let (temp, store, mut wt) = setup();
        write(&temp, "run.sh", "#!/bin/sh");
        fs::set_permissions(temp.path().join("run.sh"), fs::Permissions::from_mode(0o755))
            .unwrap();
        wt.stage("run.sh").unwrap();
        let tree = commit(&store, &mut wt);

        fs::remove_file(temp.path().join("run.sh")).unwrap();
        wt.checkout_tree(&tree, true).unwrap();
        let mode = fs::metadata(temp.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn is_under_matches_whole_segments() {
        assert!(is_under("a/b", "a"));
        assert!(is_under("a", "a"));
        assert!(is_under("x", ""));
        assert!(!is_under("ab/c", "a"));
    }
}
