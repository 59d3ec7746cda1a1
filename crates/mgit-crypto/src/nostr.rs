//! NIP-01 event envelopes.
//!
//! The core never talks to relays. It only produces and checks signed
//! events so that a caller can announce repository state to the network.

use serde::{Deserialize, Serialize};
use mgit_types::{NostrPubkey, ObjectId};

use crate::hasher::ContentHasher;
use crate::signer::{verify_digest, Signature, SignatureError, SigningKey};

/// Replaceable event kind for repository state announcements (NIP-34).
pub const KIND_REPO_STATE: u32 = 30618;

/// A signed Nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    /// Hex SHA-256 of the canonical serialization.
    pub id: String,
    pub pubkey: NostrPubkey,
    pub created_at: i64,
    pub kind: u32,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: Signature,
}

impl NostrEvent {
    /// Canonical serialization `[0, pubkey, created_at, kind, tags, content]`.
    fn canonical_json(
        pubkey: &NostrPubkey,
        created_at: i64,
        kind: u32,
        tags: &[Vec<String>],
        content: &str,
    ) -> String {
        serde_json::json!([0, pubkey.to_hex(), created_at, kind, tags, content]).to_string()
    }

    /// Event id digest for the given fields.
    pub fn compute_id(
        pubkey: &NostrPubkey,
        created_at: i64,
        kind: u32,
        tags: &[Vec<String>],
        content: &str,
    ) -> [u8; 32] {
        let json = Self::canonical_json(pubkey, created_at, kind, tags, content);
        ContentHasher::digest(json.as_bytes())
    }

    /// Build and sign an event.
    pub fn sign(
        key: &SigningKey,
        created_at: i64,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Result<Self, SignatureError> {
        let content = content.into();
        let pubkey = key.public_key();
        let id = Self::compute_id(&pubkey, created_at, kind, &tags, &content);
        let sig = key.sign_digest(&id)?;
        Ok(Self {
            id: hex::encode(id),
            pubkey,
            created_at,
            kind,
            tags,
            content,
            sig,
        })
    }

    /// Build and sign an event stamped with the current time.
    pub fn sign_now(
        key: &SigningKey,
        kind: u32,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Result<Self, SignatureError> {
        Self::sign(key, chrono::Utc::now().timestamp(), kind, tags, content)
    }

    /// Repository state announcement: `d` tag naming the repository, one tag
    /// per ref pointing at its commit, and `HEAD` naming the current branch.
    pub fn repo_state(
        key: &SigningKey,
        repo_id: &str,
        head_branch: &str,
        refs: &[(String, ObjectId)],
    ) -> Result<Self, SignatureError> {
        let mut tags = vec![vec!["d".to_string(), repo_id.to_string()]];
        for (name, id) in refs {
            tags.push(vec![name.clone(), id.to_hex()]);
        }
        tags.push(vec![
            "HEAD".to_string(),
            format!("ref: refs/heads/{head_branch}"),
        ]);
        Self::sign_now(key, KIND_REPO_STATE, tags, "")
    }

    /// Recompute the id and check the signature. Never errors.
    pub fn verify(&self) -> bool {
        let id = Self::compute_id(
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        );
        hex::encode(id) == self.id && verify_digest(&id, &self.sig, &self.pubkey)
    }

    /// Value of the first tag with the given name.
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.first().map(String::as_str) == Some(name))
            .and_then(|t| t.get(1))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SigningKey {
        SigningKey::from_bytes(&[1u8; 32]).unwrap()
    }

    #[test]
    fn signed_event_verifies() {
        let ev = NostrEvent::sign(&key(), 1_700_000_000, 1, vec![], "hello").unwrap();
        assert!(ev.verify());
        assert_eq!(ev.id.len(), 64);
    }

    #[test]
    fn tampered_content_fails() {
        let mut ev = NostrEvent::sign(&key(), 1_700_000_000, 1, vec![], "hello").unwrap();
        ev.content = "goodbye".into();
        assert!(!ev.verify());
    }

    #[test]
    fn tampered_id_fails() {
        let mut ev = NostrEvent::sign(&key(), 1_700_000_000, 1, vec![], "x").unwrap();
        ev.id = "00".repeat(32);
        assert!(!ev.verify());
    }

    #[test]
    fn canonical_form_is_nip01_array() {
        let pk = NostrPubkey::from_bytes([0xaa; 32]);
        let json = NostrEvent::canonical_json(
            &pk,
            42,
            1,
            &[vec!["t".into(), "x".into()]],
            "a\"b\n",
        );
        assert_eq!(
            json,
            format!("[0,\"{}\",42,1,[[\"t\",\"x\"]],\"a\\\"b\\n\"]", "aa".repeat(32))
        );
    }

    #[test]
    fn repo_state_carries_refs() {
        let tip = ObjectId::from_bytes(b"commit");
        let ev = NostrEvent::repo_state(
            &key(),
            "medical-history",
            "main",
            &[("refs/heads/main".to_string(), tip)],
        )
        .unwrap();
        assert_eq!(ev.kind, KIND_REPO_STATE);
        assert_eq!(ev.tag("d"), Some("medical-history"));
        assert_eq!(ev.tag("refs/heads/main"), Some(tip.to_hex().as_str()));
        assert_eq!(ev.tag("HEAD"), Some("ref: refs/heads/main"));
        assert!(ev.verify());
    }

    #[test]
    fn json_roundtrip_keeps_signature_valid() {
        let ev = NostrEvent::sign(&key(), 7, 1, vec![], "payload").unwrap();
        let json = serde_json::to_string(&ev).unwrap();
        let back: NostrEvent = serde_json::from_str(&json).unwrap();
        assert!(back.verify());
    }
}
