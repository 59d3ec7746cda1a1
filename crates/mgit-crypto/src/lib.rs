//! Hash & signature engine for MGit.
//!
//! Provides SHA-256 content hashing, BIP-340 Schnorr signing over secp256k1
//! following the Nostr event convention, and NIP-01 event envelopes.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod hasher;
pub mod nostr;
pub mod signer;

pub use hasher::ContentHasher;
pub use nostr::{NostrEvent, KIND_REPO_STATE};
pub use signer::{sign, verify, Signature, SignatureError, SigningKey};
