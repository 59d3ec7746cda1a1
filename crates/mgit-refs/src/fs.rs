//! Loose-file reference store.
//!
//! Layout under the repository directory, as git does it:
//!
//! - `<root>/refs/heads/main` holds `<64 hex>\n`
//! - `<root>/HEAD` holds `ref: refs/heads/main\n` or `<64 hex>\n`
//!
//! Every write goes through a temp file and an atomic rename. Updates made
//! through one `FsRefStore` are serialized by an internal mutex, which is
//! what makes `compare_and_swap` atomic; separate processes sharing a
//! directory are not coordinated.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use mgit_store::fs::write_atomic;
use mgit_types::ObjectId;

use crate::error::{RefError, Result};
use crate::names::{validate_branch_name, validate_ref_name};
use crate::traits::RefStore;
use crate::types::Head;

/// Filesystem-backed [`RefStore`].
#[derive(Debug)]
pub struct FsRefStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsRefStore {
    /// Open a ref store rooted at a repository directory (e.g. `.mgit`).
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join("refs"))?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_file(&self, name: &str) -> Result<Option<ObjectId>> {
        let text = match std::fs::read_to_string(self.ref_path(name)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        ObjectId::from_hex(text.trim())
            .map(Some)
            .map_err(|e| RefError::Corrupt {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    fn write_file(&self, name: &str, target: ObjectId) -> Result<()> {
        write_atomic(&self.ref_path(name), format!("{target}\n").as_bytes())?;
        Ok(())
    }

    fn collect(&self, dir: &Path, prefix: &str, out: &mut Vec<(String, ObjectId)>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            // Temp files from in-flight writes start with a dot.
            if file_name.starts_with('.') {
                continue;
            }
            let name = format!("{prefix}/{file_name}");
            if entry.file_type()?.is_dir() {
                self.collect(&entry.path(), &name, out)?;
            } else if let Some(id) = self.read_file(&name)? {
                out.push((name, id));
            }
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|e| RefError::Serialization(format!("lock poisoned: {e}")))
    }
}

impl RefStore for FsRefStore {
    fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        validate_ref_name(name)?;
        self.read_file(name)
    }

    fn write_ref(&self, name: &str, target: ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let _guard = self.lock()?;
        self.write_file(name, target)?;
        tracing::debug!(name, %target, "ref written");
        Ok(())
    }

    fn compare_and_swap(
        &self,
        name: &str,
        expected: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<()> {
        validate_ref_name(name)?;
        let _guard = self.lock()?;
        let actual = self.read_file(name)?;
        if actual != expected {
            return Err(RefError::CasFailed {
                name: name.to_string(),
                expected,
                actual,
            });
        }
        self.write_file(name, new)?;
        tracing::debug!(name, %new, "ref advanced");
        Ok(())
    }

    fn delete_ref(&self, name: &str) -> Result<bool> {
        validate_ref_name(name)?;
        let _guard = self.lock()?;
        if let Some(Head::Symbolic(current)) = self.head()? {
            if name == format!("refs/heads/{current}") {
                return Err(RefError::DeleteCurrentBranch { name: current });
            }
        }
        match std::fs::remove_file(self.ref_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let mut all = Vec::new();
        self.collect(&self.root.join("refs"), "refs", &mut all)?;
        let mut result: Vec<(String, ObjectId)> = all
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .collect();
        result.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(result)
    }

    fn head(&self) -> Result<Option<Head>> {
        let text = match std::fs::read_to_string(self.root.join("HEAD")) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = text.trim();
        if let Some(target) = text.strip_prefix("ref: refs/heads/") {
            return Ok(Some(Head::Symbolic(target.to_string())));
        }
        ObjectId::from_hex(text)
            .map(|id| Some(Head::Detached(id)))
            .map_err(|e| RefError::Corrupt {
                name: "HEAD".into(),
                reason: e.to_string(),
            })
    }

    fn set_head(&self, branch: &str) -> Result<()> {
        validate_branch_name(branch)?;
        write_atomic(
            &self.root.join("HEAD"),
            format!("ref: refs/heads/{branch}\n").as_bytes(),
        )?;
        Ok(())
    }

    fn set_head_detached(&self, commit: ObjectId) -> Result<()> {
        write_atomic(&self.root.join("HEAD"), format!("{commit}\n").as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_hash([n; 32])
    }

    fn create_test_store() -> (TempDir, FsRefStore) {
        let temp = TempDir::new().expect("create temp dir");
        let store = FsRefStore::open(temp.path().join(".mgit")).unwrap();
        (temp, store)
    }

    #[test]
    fn ref_file_layout() {
        let (temp, store) = create_test_store();
        store.write_ref("refs/heads/main", id(1)).unwrap();
        let text =
            std::fs::read_to_string(temp.path().join(".mgit/refs/heads/main")).unwrap();
        assert_eq!(text, format!("{}\n", id(1)));
    }

    #[test]
    fn head_file_layout() {
        let (temp, store) = create_test_store();
        store.set_head("main").unwrap();
        let text = std::fs::read_to_string(temp.path().join(".mgit/HEAD")).unwrap();
        assert_eq!(text, "ref: refs/heads/main\n");
        assert_eq!(store.head().unwrap(), Some(Head::Symbolic("main".into())));

        store.set_head_detached(id(9)).unwrap();
        assert_eq!(store.head().unwrap(), Some(Head::Detached(id(9))));
    }

    #[test]
    fn cas_semantics_match_memory_store() {
        let (_temp, store) = create_test_store();
        store.compare_and_swap("refs/heads/main", None, id(1)).unwrap();
        store
            .compare_and_swap("refs/heads/main", Some(id(1)), id(2))
            .unwrap();
        assert!(matches!(
            store.compare_and_swap("refs/heads/main", Some(id(1)), id(3)),
            Err(RefError::CasFailed { actual: Some(a), .. }) if a == id(2)
        ));
        assert_eq!(store.read_ref("refs/heads/main").unwrap(), Some(id(2)));
    }

    #[test]
    fn refs_survive_reopen() {
        let (temp, store) = create_test_store();
        store.write_ref("refs/heads/main", id(1)).unwrap();
        store.write_ref("refs/remotes/origin/main", id(2)).unwrap();
        store.set_head("main").unwrap();
        drop(store);

        let store = FsRefStore::open(temp.path().join(".mgit")).unwrap();
        assert_eq!(store.resolve_head().unwrap(), Some(id(1)));
        assert_eq!(
            store.list_refs("").unwrap(),
            vec![
                ("refs/heads/main".to_string(), id(1)),
                ("refs/remotes/origin/main".to_string(), id(2)),
            ]
        );
        assert_eq!(store.remotes().unwrap(), vec!["origin"]);
    }

    #[test]
    fn list_skips_temp_files() {
        let (temp, store) = create_test_store();
        store.write_ref("refs/heads/main", id(1)).unwrap();
        std::fs::write(temp.path().join(".mgit/refs/heads/.tmpABC"), "junk").unwrap();
        assert_eq!(store.list_refs("refs/heads/").unwrap().len(), 1);
    }

    #[test]
    fn corrupt_ref_is_reported() {
        let (temp, store) = create_test_store();
        std::fs::create_dir_all(temp.path().join(".mgit/refs/heads")).unwrap();
        std::fs::write(temp.path().join(".mgit/refs/heads/main"), "garbage\n").unwrap();
        assert!(matches!(
            store.read_ref("refs/heads/main"),
            Err(RefError::Corrupt { .. })
        ));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let (_temp, store) = create_test_store();
        assert!(store.write_ref("refs/../../escape", id(1)).is_err());
        assert!(store.read_ref("refs/heads/../../../etc").is_err());
    }

    #[test]
    fn delete_ref_file() {
        let (_temp, store) = create_test_store();
        store.write_ref("refs/heads/topic", id(1)).unwrap();
        assert!(store.delete_ref("refs/heads/topic").unwrap());
        assert!(!store.delete_ref("refs/heads/topic").unwrap());
        store.write_ref("refs/heads/main", id(1)).unwrap();
        store.set_head("main").unwrap();
        assert!(matches!(
            store.delete_ref("refs/heads/main"),
            Err(RefError::DeleteCurrentBranch { .. })
        ));
    }
}
