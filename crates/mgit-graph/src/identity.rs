//! Signing capabilities.
//!
//! A [`SigningIdentity`] is what the graph asks to sign a commit digest.
//! [`LocalIdentity`] holds a key directly (CLI, tests). [`ProviderIdentity`]
//! borrows a key from an external [`KeyProvider`] for exactly one signature.

use std::sync::Arc;

use mgit_crypto::{Signature, SignatureError, SigningKey};
use mgit_types::NostrPubkey;

/// Something that can sign a commit on behalf of a Nostr identity.
pub trait SigningIdentity: Send + Sync {
    /// The x-only public key commits will carry as author.
    fn public_key(&self) -> NostrPubkey;

    /// Sign a 32-byte digest.
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignatureError>;
}

/// An identity backed by an in-process signing key.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    key: SigningKey,
}

impl LocalIdentity {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        Self::new(SigningKey::generate())
    }
}

impl SigningIdentity for LocalIdentity {
    fn public_key(&self) -> NostrPubkey {
        self.key.public_key()
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignatureError> {
        self.key.sign_digest(digest)
    }
}

/// External key/identity provider (secure enclave, remote signer, keychain).
pub trait KeyProvider: Send + Sync {
    /// Public key for a named identity.
    fn public_key(&self, identity: &str) -> Result<NostrPubkey, SignatureError>;

    /// Produce the signing key for a named identity, on demand.
    fn signing_key_for(&self, identity: &str) -> Result<SigningKey, SignatureError>;
}

/// Adapts a [`KeyProvider`] to [`SigningIdentity`].
///
/// The public key is resolved once at construction. The private key is
/// requested per signature and dropped immediately afterwards.
pub struct ProviderIdentity {
    provider: Arc<dyn KeyProvider>,
    identity: String,
    public_key: NostrPubkey,
}

impl ProviderIdentity {
    pub fn new(
        provider: Arc<dyn KeyProvider>,
        identity: impl Into<String>,
    ) -> Result<Self, SignatureError> {
        let identity = identity.into();
        let public_key = provider.public_key(&identity)?;
        Ok(Self {
            provider,
            identity,
            public_key,
        })
    }

    /// The provider-side identity name.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

impl SigningIdentity for ProviderIdentity {
    fn public_key(&self) -> NostrPubkey {
        self.public_key
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignatureError> {
        let key = self.provider.signing_key_for(&self.identity)?;
        if key.public_key() != self.public_key {
            return Err(SignatureError::KeyUnavailable(format!(
                "provider returned a different key for {}",
                self.identity
            )));
        }
        key.sign_digest(digest)
    }
}

impl std::fmt::Debug for ProviderIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderIdentity")
            .field("identity", &self.identity)
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Key provider holding keys in memory and counting key requests.
    #[derive(Default)]
    pub(crate) struct TestProvider {
        keys: HashMap<String, SigningKey>,
        pub(crate) requests: AtomicUsize,
    }

    impl TestProvider {
        pub(crate) fn with_key(name: &str, key: SigningKey) -> Self {
            let mut keys = HashMap::new();
            keys.insert(name.to_string(), key);
            Self {
                keys,
                requests: AtomicUsize::new(0),
            }
        }
    }

    impl KeyProvider for TestProvider {
        fn public_key(&self, identity: &str) -> Result<NostrPubkey, SignatureError> {
            self.keys
                .get(identity)
                .map(SigningKey::public_key)
                .ok_or_else(|| SignatureError::KeyUnavailable(identity.to_string()))
        }

        fn signing_key_for(&self, identity: &str) -> Result<SigningKey, SignatureError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.keys
                .get(identity)
                .cloned()
                .ok_or_else(|| SignatureError::KeyUnavailable(identity.to_string()))
        }
    }

    #[test]
    fn local_identity_signs_verifiably() {
        let id = LocalIdentity::generate();
        let digest = [7u8; 32];
        let sig = id.sign_digest(&digest).unwrap();
        assert!(mgit_crypto::signer::verify_digest(&digest, &sig, &id.public_key()));
    }

    #[test]
    fn provider_identity_fetches_key_per_signature() {
        let key = SigningKey::generate();
        let provider = Arc::new(TestProvider::with_key("patient", key.clone()));
        let identity = ProviderIdentity::new(provider.clone(), "patient").unwrap();
        assert_eq!(identity.public_key(), key.public_key());
        assert_eq!(provider.requests.load(Ordering::SeqCst), 0);

        identity.sign_digest(&[1u8; 32]).unwrap();
        identity.sign_digest(&[2u8; 32]).unwrap();
        assert_eq!(provider.requests.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unknown_identity_is_rejected() {
        let provider = Arc::new(TestProvider::default());
        assert!(matches!(
            ProviderIdentity::new(provider, "nobody"),
            Err(SignatureError::KeyUnavailable(_))
        ));
    }

    #[test]
    fn debug_does_not_leak_keys() {
        let provider = Arc::new(TestProvider::with_key("p", SigningKey::generate()));
        let identity = ProviderIdentity::new(provider, "p").unwrap();
        let dbg = format!("{identity:?}");
        assert!(dbg.contains("identity"));
        assert!(!dbg.contains("SigningKey"));
    }
}
