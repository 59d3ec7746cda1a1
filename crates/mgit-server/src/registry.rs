//! Named repositories hosted by the server.
//!
//! A repository on disk lives in `<repos_root>/<name>/`, with objects under
//! `objects/` and refs beside them, the same layout as a client's `.mgit`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use mgit_refs::FsRefStore;
use mgit_store::FsObjectStore;
use mgit_sync::HostedRepository;
use tracing::info;

use crate::error::{ServerError, ServerResult};

pub struct RepoRegistry {
    root: Option<PathBuf>,
    repos: RwLock<HashMap<String, Arc<HostedRepository>>>,
}

impl RepoRegistry {
    pub fn in_memory() -> Self {
        Self {
            root: None,
            repos: RwLock::new(HashMap::new()),
        }
    }

    pub fn on_disk(root: impl Into<PathBuf>) -> ServerResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root: Some(root),
            repos: RwLock::new(HashMap::new()),
        })
    }

    /// An existing repository, or `None`.
    pub fn get(&self, name: &str) -> ServerResult<Option<Arc<HostedRepository>>> {
        validate_repo_name(name)?;
        if let Some(repo) = self.repos.read().expect("lock poisoned").get(name) {
            return Ok(Some(repo.clone()));
        }
        match &self.root {
            Some(root) if root.join(name).is_dir() => self.open_or_create(name).map(Some),
            _ => Ok(None),
        }
    }

    pub fn open_or_create(&self, name: &str) -> ServerResult<Arc<HostedRepository>> {
        validate_repo_name(name)?;
        let mut repos = self.repos.write().expect("lock poisoned");
        if let Some(repo) = repos.get(name) {
            return Ok(repo.clone());
        }
        let repo = match &self.root {
            Some(root) => {
                let dir = root.join(name);
                let created = !dir.exists();
                let store = FsObjectStore::open(dir.join("objects"))?;
                let refs = FsRefStore::open(&dir)?;
                if created {
                    info!(repo = name, path = %dir.display(), "created repository");
                }
                HostedRepository::new(Arc::new(store), Arc::new(refs))
            }
            None => {
                info!(repo = name, "created in-memory repository");
                HostedRepository::in_memory()
            }
        };
        let repo = Arc::new(repo);
        repos.insert(name.to_string(), repo.clone());
        Ok(repo)
    }

    /// Names of every known repository, sorted.
    pub fn names(&self) -> ServerResult<Vec<String>> {
        let mut names: Vec<String> = self
            .repos
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        if let Some(root) = &self.root {
            for entry in std::fs::read_dir(root)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if validate_repo_name(name).is_ok() {
                        names.push(name.to_string());
                    }
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Repository names are a single path segment of `[A-Za-z0-9._-]`,
/// not starting with a dot.
pub fn validate_repo_name(name: &str) -> ServerResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ServerError::InvalidRepoName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mgit_store::ObjectStore;
    use mgit_types::ObjectId;

    #[test]
    fn repo_names() {
        for ok in ["alice", "records-2024", "a.b_c"] {
            assert!(validate_repo_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", ".", "..", ".hidden", "a/b", "a b", "ü"] {
            assert!(validate_repo_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn in_memory_create_and_lookup() {
        let registry = RepoRegistry::in_memory();
        assert!(registry.get("alice").unwrap().is_none());
        let created = registry.open_or_create("alice").unwrap();
        let found = registry.get("alice").unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &found));
        assert_eq!(registry.names().unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn disk_repositories_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let blob = {
            let registry = RepoRegistry::on_disk(dir.path()).unwrap();
            let repo = registry.open_or_create("alice").unwrap();
            repo.store().put_blob(b"[]").unwrap()
        };

        let registry = RepoRegistry::on_disk(dir.path()).unwrap();
        assert_eq!(registry.names().unwrap(), vec!["alice".to_string()]);
        let repo = registry.get("alice").unwrap().unwrap();
        assert!(repo.store().has(&blob));
        assert!(!repo.store().has(&ObjectId::null()));
        assert!(registry.get("bob").unwrap().is_none());
    }

    #[test]
    fn invalid_names_never_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let registry = RepoRegistry::on_disk(dir.path().join("repos")).unwrap();
        assert!(matches!(
            registry.open_or_create(".."),
            Err(ServerError::InvalidRepoName(_))
        ));
    }
}
