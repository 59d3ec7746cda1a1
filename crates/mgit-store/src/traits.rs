use mgit_types::ObjectId;

use crate::error::StoreResult;
use crate::object::{Blob, Commit, StoredObject, Tree};

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - `put` is idempotent: the same bytes always produce the same id and the
///   store grows by at most one object.
/// - A partially written object is never visible to `get` or `has`.
/// - `get` re-hashes what it reads and fails with `IntegrityError` on a
///   mismatch instead of returning the bytes.
/// - Concurrent reads are always safe (objects are immutable).
pub trait ObjectStore: Send + Sync {
    /// Store framed object bytes and return their id.
    ///
    /// Bytes that are not a well-formed framed object are rejected.
    fn put(&self, bytes: &[u8]) -> StoreResult<ObjectId>;

    /// Read the framed bytes of an object.
    fn get(&self, id: &ObjectId) -> StoreResult<Vec<u8>>;

    /// Check whether an object exists in the store.
    fn has(&self, id: &ObjectId) -> bool;

    /// Every object id in the store, sorted.
    fn object_ids(&self) -> StoreResult<Vec<ObjectId>>;

    /// Store a decoded object.
    fn put_object(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        self.put(&object.encode())
    }

    /// Read and decode an object.
    fn get_object(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        StoredObject::decode(&self.get(id)?).map_err(|e| e.for_object(id))
    }

    fn put_blob(&self, data: &[u8]) -> StoreResult<ObjectId> {
        self.put_object(&Blob::new(data.to_vec()).to_stored_object())
    }

    fn put_tree(&self, tree: &Tree) -> StoreResult<ObjectId> {
        self.put_object(&tree.to_stored_object()?)
    }

    fn put_commit(&self, commit: &Commit) -> StoreResult<ObjectId> {
        self.put_object(&commit.to_stored_object())
    }

    fn get_blob(&self, id: &ObjectId) -> StoreResult<Blob> {
        Blob::from_stored_object(&self.get_object(id)?).map_err(|e| e.for_object(id))
    }

    fn get_tree(&self, id: &ObjectId) -> StoreResult<Tree> {
        Tree::from_stored_object(&self.get_object(id)?).map_err(|e| e.for_object(id))
    }

    fn get_commit(&self, id: &ObjectId) -> StoreResult<Commit> {
        Commit::from_stored_object(&self.get_object(id)?).map_err(|e| e.for_object(id))
    }
}
