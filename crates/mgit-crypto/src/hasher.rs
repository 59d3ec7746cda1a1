use sha2::{Digest, Sha256};
use mgit_types::ObjectId;

/// SHA-256 content hasher.
///
/// MGit objects are type-separated by their Git-style `<kind> <len>\0`
/// header, so the hasher itself carries no domain tag: the id of an object
/// is exactly the SHA-256 of the bytes handed to the store.
pub struct ContentHasher;

impl ContentHasher {
    /// Hash raw bytes into an object id.
    pub fn hash(data: &[u8]) -> ObjectId {
        ObjectId::from_hash(Self::digest(data))
    }

    /// Hash several byte slices as if they were concatenated.
    pub fn hash_parts(parts: &[&[u8]]) -> ObjectId {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        ObjectId::from_hash(hasher.finalize().into())
    }

    /// Raw SHA-256 digest.
    pub fn digest(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    /// Verify that data produces the expected object ID.
    pub fn verify(data: &[u8], expected: &ObjectId) -> bool {
        Self::hash(data) == *expected
    }
}
