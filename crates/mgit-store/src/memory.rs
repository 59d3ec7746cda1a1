use std::collections::HashMap;
use std::sync::RwLock;

use mgit_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// In-memory, HashMap-based object store.
///
/// Intended for tests and embedding. All objects are held in memory behind a
/// `RwLock` for safe concurrent access. Objects are cloned on read/write.
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, Vec<u8>>>,
}

impl InMemoryObjectStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Total framed bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.objects
            .read()
            .expect("lock poisoned")
            .values()
            .map(|bytes| bytes.len() as u64)
            .sum()
    }

    /// Overwrite the bytes stored under `id` without hashing them.
    ///
    /// Simulates media corruption; subsequent reads of `id` fail with
    /// `IntegrityError`.
    pub fn overwrite_raw(&self, id: ObjectId, bytes: Vec<u8>) {
        self.objects.write().expect("lock poisoned").insert(id, bytes);
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, bytes: &[u8]) -> StoreResult<ObjectId> {
        let id = StoredObject::decode(bytes)?.compute_id();
        let mut map = self.objects.write().expect("lock poisoned");
        map.entry(id).or_insert_with(|| {
            tracing::debug!(%id, size = bytes.len(), "stored object");
            bytes.to_vec()
        });
        Ok(id)
    }

    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>> {
        let map = self.objects.read().expect("lock poisoned");
        let bytes = map.get(id).ok_or(StoreError::NotFound(*id))?;
        let computed = ObjectId::from_bytes(bytes);
        if computed != *id {
            return Err(StoreError::IntegrityError { id: *id, computed });
        }
        Ok(bytes.clone())
    }

    fn has(&self, id: &ObjectId) -> bool {
        self.objects.read().expect("lock poisoned").contains_key(id)
    }

    fn object_ids(&self) -> StoreResult<Vec<ObjectId>> {
        let map = self.objects.read().expect("lock poisoned");
        let mut ids: Vec<ObjectId> = map.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len();
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &count)
            .finish()
    }
}
