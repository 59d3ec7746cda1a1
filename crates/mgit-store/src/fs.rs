use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mgit_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Write `bytes` to `path` atomically.
///
/// The data goes to a temporary file in the destination directory, is
/// synced, and is then renamed over `path`. Readers see either the old
/// contents or the new ones, never a prefix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    std::fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Loose-object store on the local filesystem.
///
/// Objects live at `<root>/<first 2 hex>/<remaining 62 hex>`, holding the
/// framed bytes uncompressed.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.root.join(&hex[..2]).join(&hex[2..])
    }
}

impl ObjectStore for FsObjectStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<ObjectId> {
        let id = StoredObject::decode(bytes)?.compute_id();
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        write_atomic(&path, bytes)?;
        tracing::debug!(%id, size = bytes.len(), "wrote loose object");
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let bytes = match std::fs::read(self.object_path(id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(*id))
            }
            Err(e) => return Err(e.into()),
        };
        let computed = ObjectId::from_bytes(&bytes);
        if computed != *id {
            tracing::error!(%id, %computed, "object failed integrity check");
            return Err(StoreError::IntegrityError { id: *id, computed });
        }
        Ok(bytes)
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    fn object_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let mut ids = Vec::new();
        for dir in std::fs::read_dir(&self.root)? {
            let dir = dir?;
            if !dir.file_type()?.is_dir() {
                continue;
            }
            let prefix = dir.file_name().to_string_lossy().into_owned();
            if prefix.len() != 2 {
                continue;
            }
            for file in std::fs::read_dir(dir.path())? {
                let name = file?.file_name().to_string_lossy().into_owned();
                // Skips in-flight temp files along with anything else foreign.
                if let Ok(id) = ObjectId::from_hex(&format!("{prefix}{name}")) {
                    ids.push(id);
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
