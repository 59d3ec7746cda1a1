use k256::schnorr;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use signature::hazmat::{PrehashSigner, PrehashVerifier};
use mgit_types::NostrPubkey;

use crate::hasher::ContentHasher;

/// secp256k1 Schnorr signing key (private).
///
/// The core never persists this type; callers obtain one from their key
/// provider for the duration of a signature.
#[derive(Clone)]
pub struct SigningKey(schnorr::SigningKey);

/// BIP-340 Schnorr signature (64 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        Self(schnorr::SigningKey::random(&mut rand::thread_rng()))
    }

    /// Create from a raw 32-byte secret.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        schnorr::SigningKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| SignatureError::InvalidKey)
    }

    /// Parse a hex-encoded 32-byte secret.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s.trim()).map_err(|_| SignatureError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| SignatureError::InvalidKey)?;
        Self::from_bytes(&arr)
    }

    /// Raw secret key bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.to_bytes());
        out
    }

    /// The x-only public key, as published in Nostr events.
    pub fn public_key(&self) -> NostrPubkey {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.0.verifying_key().to_bytes());
        NostrPubkey::from_bytes(out)
    }

    /// Sign a 32-byte digest (BIP-340, zero auxiliary randomness).
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignatureError> {
        let sig: schnorr::Signature = self
            .0
            .sign_prehash(digest)
            .map_err(|e| SignatureError::SigningFailed(e.to_string()))?;
        Ok(Signature(sig.to_bytes()))
    }
}

impl Signature {
    /// Wrap raw signature bytes. No validation happens until verification.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// The raw 64 bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Lowercase hex encoding (128 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from 128 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(s).map_err(|_| SignatureError::Malformed)?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| SignatureError::Malformed)?;
        Ok(Self(arr))
    }
}

/// Sign the canonical signable bytes of an object.
///
/// Following the Nostr convention the signature covers `SHA-256(signable)`.
pub fn sign(signable: &[u8], key: &SigningKey) -> Result<Signature, SignatureError> {
    key.sign_digest(&ContentHasher::digest(signable))
}

/// Verify a signature over signable bytes. Never errors: malformed keys or
/// signatures simply return `false`.
pub fn verify(signable: &[u8], signature: &Signature, pubkey: &NostrPubkey) -> bool {
    verify_digest(&ContentHasher::digest(signable), signature, pubkey)
}

/// Verify a signature over a precomputed 32-byte digest.
pub fn verify_digest(digest: &[u8; 32], signature: &Signature, pubkey: &NostrPubkey) -> bool {
    let Ok(key) = schnorr::VerifyingKey::from_bytes(pubkey.as_bytes()) else {
        return false;
    };
    let Ok(sig) = schnorr::Signature::try_from(signature.0.as_slice()) else {
        return false;
    };
    key.verify_prehash(digest, &sig).is_ok()
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors from signing operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature encoding")]
    Malformed,
    #[error("invalid key")]
    InvalidKey,
    #[error("signing failed: {0}")]
    SigningFailed(String),
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sign_and_verify() {
        let sk = SigningKey::generate();
        let sig = sign(b"hello world", &sk).unwrap();
        assert!(verify(b"hello world", &sig, &sk.public_key()));
    }

    #[test]
    fn signing_is_deterministic() {
        let sk = SigningKey::from_bytes(&[3u8; 32]).unwrap();
        assert_eq!(sign(b"msg", &sk).unwrap(), sign(b"msg", &sk).unwrap());
    }

    #[test]
    fn verify_fails_on_wrong_message() {
        let sk = SigningKey::generate();
        let sig = sign(b"correct message", &sk).unwrap();
        assert!(!verify(b"wrong message", &sig, &sk.public_key()));
    }

    #[test]
    fn verify_fails_with_wrong_key() {
        let sk1 = SigningKey::generate();
        let sk2 = SigningKey::generate();
        let sig = sign(b"message", &sk1).unwrap();
        assert!(!verify(b"message", &sig, &sk2.public_key()));
    }

    #[test]
    fn verify_returns_false_for_garbage() {
        let sk = SigningKey::generate();
        let garbage_sig = Signature::from_bytes([0xff; 64]);
        assert!(!verify(b"m", &garbage_sig, &sk.public_key()));
        let not_a_point = NostrPubkey::from_bytes([0xff; 32]);
        let sig = sign(b"m", &sk).unwrap();
        assert!(!verify(b"m", &sig, &not_a_point));
    }

    #[test]
    fn zero_secret_is_rejected() {
        assert_eq!(
            SigningKey::from_bytes(&[0u8; 32]).unwrap_err(),
            SignatureError::InvalidKey
        );
    }

    #[test]
    fn hex_secret_roundtrip() {
        let sk = SigningKey::generate();
        let parsed = SigningKey::from_hex(&hex::encode(sk.to_bytes())).unwrap();
        assert_eq!(parsed.public_key(), sk.public_key());
    }

    #[test]
    fn signature_hex_roundtrip() {
        let sk = SigningKey::generate();
        let sig = sign(b"test", &sk).unwrap();
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert_eq!(Signature::from_hex("abcd"), Err(SignatureError::Malformed));
    }

    #[test]
    fn debug_redacts_signing_key() {
        let sk = SigningKey::generate();
        assert!(format!("{sk:?}").contains("redacted"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn any_bit_flip_breaks_verification(
            payload in proptest::collection::vec(any::<u8>(), 1..256),
            bit in any::<proptest::sample::Index>(),
        ) {
            let sk = SigningKey::from_bytes(&[9u8; 32]).unwrap();
            let sig = sign(&payload, &sk).unwrap();
            prop_assert!(verify(&payload, &sig, &sk.public_key()));

            let mut tampered = payload.clone();
            let i = bit.index(tampered.len() * 8);
            tampered[i / 8] ^= 1 << (i % 8);
            prop_assert!(!verify(&tampered, &sig, &sk.public_key()));
        }
    }
}
