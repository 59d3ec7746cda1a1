//! Commit lifecycle: `Staged -> Signed -> Persisted`.
//!
//! Each state is its own type, so a commit can only be written once it
//! carries a signature and its id is final. A commit whose signing fails is
//! dropped; it is never retried or written unsigned.

use mgit_refs::{RefError, RefStore};
use mgit_store::{Commit, ObjectStore, SignatureStatus};
use mgit_types::{NostrPubkey, ObjectId};

use crate::error::{GraphError, GraphResult};
use crate::identity::SigningIdentity;

/// Tree built, parents chosen, not yet signed.
#[derive(Debug, Clone)]
pub struct StagedCommit {
    commit: Commit,
}

/// Signature attached; the id is now fixed.
#[derive(Debug, Clone)]
pub struct SignedCommit {
    id: ObjectId,
    commit: Commit,
}

/// Written to the object store and reachable from its branch.
#[derive(Debug, Clone)]
pub struct PersistedCommit {
    pub id: ObjectId,
    pub commit: Commit,
}

impl StagedCommit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: NostrPubkey,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            commit: Commit::new(tree, parents, author, timestamp, message),
        }
    }

    /// The digest the author is asked to sign.
    pub fn signing_digest(&self) -> [u8; 32] {
        self.commit.signing_digest()
    }

    /// Sign with `identity`, which must be the commit's author.
    ///
    /// The produced signature is checked before it is accepted.
    pub fn sign(self, identity: &dyn SigningIdentity) -> GraphResult<SignedCommit> {
        if identity.public_key() != self.commit.author {
            return Err(GraphError::Signature(
                mgit_crypto::SignatureError::InvalidKey,
            ));
        }
        let signature = identity.sign_digest(&self.signing_digest())?;
        let commit = self.commit.with_signature(signature);
        if commit.verify() != SignatureStatus::Verified {
            return Err(GraphError::Signature(
                mgit_crypto::SignatureError::SigningFailed(
                    "identity produced a signature that does not verify".into(),
                ),
            ));
        }
        Ok(SignedCommit {
            id: commit.id(),
            commit,
        })
    }
}

impl SignedCommit {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Write the commit object, then move `ref_name` from `expected` to it.
    ///
    /// The object is written first so the ref never points at a missing
    /// commit. If the ref moved in the meantime the object stays behind
    /// unreferenced and the call fails with `DivergedParent`.
    pub fn persist(
        self,
        store: &dyn ObjectStore,
        refs: &dyn RefStore,
        ref_name: &str,
        expected: Option<ObjectId>,
    ) -> GraphResult<PersistedCommit> {
        let id = store.put_commit(&self.commit)?;
        debug_assert_eq!(id, self.id);
        match refs.compare_and_swap(ref_name, expected, id) {
            Ok(()) => Ok(PersistedCommit {
                id,
                commit: self.commit,
            }),
            Err(RefError::CasFailed { actual, .. }) => Err(GraphError::DivergedParent {
                branch: ref_name.to_string(),
                tip: actual,
                first_parent: expected,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentity;
    use mgit_crypto::{Signature, SignatureError};
    use mgit_refs::InMemoryRefStore;
    use mgit_store::InMemoryObjectStore;

    struct BrokenIdentity(NostrPubkey);

    impl SigningIdentity for BrokenIdentity {
        fn public_key(&self) -> NostrPubkey {
            self.0
        }
        fn sign_digest(&self, _digest: &[u8; 32]) -> Result<Signature, SignatureError> {
            Ok(Signature::from_bytes([0u8; 64]))
        }
    }

    fn staged(author: NostrPubkey) -> StagedCommit {
        StagedCommit::new(ObjectId::from_bytes(b"tree"), vec![], author, 10, "init")
    }

    #[test]
    fn staged_to_persisted() {
        let store = InMemoryObjectStore::new();
        let refs = InMemoryRefStore::new();
        let identity = LocalIdentity::generate();

        let signed = staged(identity.public_key()).sign(&identity).unwrap();
        let id = signed.id();
        let persisted = signed
            .persist(&store, &refs, "refs/heads/main", None)
            .unwrap();

        assert_eq!(persisted.id, id);
        assert!(store.has(&id));
        assert_eq!(refs.read_ref("refs/heads/main").unwrap(), Some(id));
    }

    #[test]
    fn wrong_identity_cannot_sign() {
        let author = LocalIdentity::generate();
        let other = LocalIdentity::generate();
        assert!(matches!(
            staged(author.public_key()).sign(&other),
            Err(GraphError::Signature(SignatureError::InvalidKey))
        ));
    }

    #[test]
    fn bad_signature_is_caught_before_persist() {
        let author = LocalIdentity::generate();
        let broken = BrokenIdentity(author.public_key());
        assert!(matches!(
            staged(author.public_key()).sign(&broken),
            Err(GraphError::Signature(SignatureError::SigningFailed(_)))
        ));
    }

    #[test]
    fn lost_race_keeps_ref_untouched() {
        let store = InMemoryObjectStore::new();
        let refs = InMemoryRefStore::new();
        let identity = LocalIdentity::generate();
        let winner = ObjectId::from_bytes(b"winner");
        refs.write_ref("refs/heads/main", winner).unwrap();

        let signed = staged(identity.public_key()).sign(&identity).unwrap();
        let err = signed
            .persist(&store, &refs, "refs/heads/main", None)
            .unwrap_err();
        assert!(matches!(
            err,
            GraphError::DivergedParent { tip: Some(t), .. } if t == winner
        ));
        assert_eq!(refs.read_ref("refs/heads/main").unwrap(), Some(winner));
    }
}
