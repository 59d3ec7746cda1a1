use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use mgit_crypto::{ContentHasher, Signature};
use mgit_types::{NostrPubkey, ObjectId};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (file contents, arbitrary data).
    Blob,
    /// Directory listing: ordered entries mapping names to object references.
    Tree,
    /// Signed snapshot of a tree plus its history.
    Commit,
}

impl ObjectKind {
    /// The header keyword used in the framed encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    fn parse(s: &[u8]) -> Option<Self> {
        match s {
            b"blob" => Some(Self::Blob),
            b"tree" => Some(Self::Tree),
            b"commit" => Some(Self::Commit),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored object: kind tag + body bytes.
///
/// On disk and on the wire an object is framed the way Git frames it,
/// `<kind> SP <len> NUL <body>`, and its id is the SHA-256 of that framing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The unframed body.
    pub data: Vec<u8>,
}

impl StoredObject {
    /// Create a new stored object from kind and body.
    pub fn new(kind: ObjectKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }

    /// Framed bytes: header followed by body.
    pub fn encode(&self) -> Vec<u8> {
        let header = format!("{} {}\0", self.kind, self.data.len());
        let mut out = Vec::with_capacity(header.len() + self.data.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse framed bytes, checking the declared length.
    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        let nul = bytes
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| StoreError::Malformed("missing header terminator".into()))?;
        let header = &bytes[..nul];
        let space = header
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| StoreError::Malformed("missing space in header".into()))?;

        let kind = ObjectKind::parse(&header[..space]).ok_or_else(|| {
            StoreError::Malformed(format!(
                "unknown object kind {:?}",
                String::from_utf8_lossy(&header[..space])
            ))
        })?;
        let len: usize = std::str::from_utf8(&header[space + 1..])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::Malformed("invalid length in header".into()))?;

        let data = &bytes[nul + 1..];
        if data.len() != len {
            return Err(StoreError::Malformed(format!(
                "declared length {len}, actual {}",
                data.len()
            )));
        }
        Ok(Self::new(kind, data.to_vec()))
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        let header = format!("{} {}\0", self.kind, self.data.len());
        ContentHasher::hash_parts(&[header.as_bytes(), &self.data])
    }

    fn expect_kind(&self, expected: ObjectKind) -> StoreResult<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(StoreError::UnexpectedKind {
                id: self.compute_id(),
                expected,
                actual: self.kind,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object (analogous to git blob).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Blob, self.data.clone())
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Blob)?;
        Ok(Self {
            data: obj.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Subtree / directory (40000).
    Directory,
}

impl EntryMode {
    /// Mode string as written into tree bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "100644",
            Self::Executable => "100755",
            Self::Directory => "40000",
        }
    }

    /// Parse a mode string. Symlinks and submodules are not supported.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "100644" => Some(Self::Regular),
            "100755" => Some(Self::Executable),
            "40000" => Some(Self::Directory),
            _ => None,
        }
    }

    /// Returns `true` for blob-valued modes.
    pub fn is_file(&self) -> bool {
        !matches!(self, Self::Directory)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// File mode (regular, executable, directory).
    pub mode: EntryMode,
    /// Entry name (a single path segment).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    fn sort_key(&self) -> impl Iterator<Item = u8> + '_ {
        let suffix = if self.mode == EntryMode::Directory {
            Some(b'/')
        } else {
            None
        };
        self.name.bytes().chain(suffix)
    }
}

/// Validate a single path segment.
pub fn validate_entry_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(StoreError::InvalidTreeEntry(format!("{name:?}")));
    }
    Ok(())
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    /// Git ordering: directory names compare as if they ended in `/`.
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(other.sort_key())
            .then_with(|| self.mode.cmp(&other.mode))
            .then_with(|| self.object_id.cmp(&other.object_id))
    }
}

/// Directory listing object (analogous to git tree).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries.
    ///
    /// Entries are sorted in Git order so that the same set of entries
    /// always encodes to the same bytes.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Convert into a `StoredObject` for storage.
    ///
    /// Fails on invalid names and on duplicate names.
    pub fn to_stored_object(&self) -> StoreResult<StoredObject> {
        let mut data = Vec::new();
        let mut seen = BTreeSet::new();
        for entry in &self.entries {
            validate_entry_name(&entry.name)?;
            if !seen.insert(entry.name.as_str()) {
                return Err(StoreError::InvalidTreeEntry(format!(
                    "duplicate name {:?}",
                    entry.name
                )));
            }
            data.extend_from_slice(entry.mode.as_str().as_bytes());
            data.push(b' ');
            data.extend_from_slice(entry.name.as_bytes());
            data.push(0);
            data.extend_from_slice(entry.object_id.as_bytes());
        }
        Ok(StoredObject::new(ObjectKind::Tree, data))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Tree)?;
        let mut entries = Vec::new();
        let mut rest = obj.data.as_slice();
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|b| *b == b' ')
                .ok_or_else(|| StoreError::Malformed("tree entry without mode".into()))?;
            let mode_str = std::str::from_utf8(&rest[..space])
                .map_err(|_| StoreError::Malformed("non-ascii tree mode".into()))?;
            let mode = EntryMode::parse(mode_str).ok_or_else(|| {
                StoreError::Malformed(format!("unsupported tree mode {mode_str}"))
            })?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| StoreError::Malformed("unterminated tree entry name".into()))?;
            let name = String::from_utf8(rest[..nul].to_vec())
                .map_err(|_| StoreError::Malformed("tree entry name is not utf-8".into()))?;
            validate_entry_name(&name)
                .map_err(|_| StoreError::Malformed(format!("invalid tree entry name {name:?}")))?;
            rest = &rest[nul + 1..];

            if rest.len() < 32 {
                return Err(StoreError::Malformed("truncated tree entry id".into()));
            }
            let mut id = [0u8; 32];
            id.copy_from_slice(&rest[..32]);
            rest = &rest[32..];

            entries.push(TreeEntry::new(mode, name, ObjectId::from_hash(id)));
        }
        Ok(Self { entries })
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Outcome of checking a commit's embedded signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureStatus {
    /// Signature present and valid for the embedded author key.
    Verified,
    /// No signature attached.
    Unsigned,
    /// Signature present but does not verify.
    Invalid,
}

/// A commit: a tree snapshot, its parents, and a Nostr-signed authorship.
///
/// Body layout, in this exact order:
///
/// ```text
/// tree <hex>
/// parent <hex>                  (zero or more)
/// author <pubkey hex> <unix seconds> +0000
/// nostrsig <signature hex>      (signed commits only)
///
/// <message>
/// ```
///
/// The signature covers SHA-256 of the body without the `nostrsig` line;
/// the commit id covers the framed body including it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: NostrPubkey,
    /// Seconds since the Unix epoch, UTC.
    pub timestamp: i64,
    pub message: String,
    pub signature: Option<Signature>,
}

impl Commit {
    /// Create an unsigned commit.
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: NostrPubkey,
        timestamp: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            timestamp,
            message: message.into(),
            signature: None,
        }
    }

    /// Attach a signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    fn render(&self, include_signature: bool) -> Vec<u8> {
        let mut out = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            out.push_str(&format!("parent {parent}\n"));
        }
        out.push_str(&format!("author {} {} +0000\n", self.author, self.timestamp));
        if include_signature {
            if let Some(sig) = &self.signature {
                out.push_str(&format!("nostrsig {}\n", sig.to_hex()));
            }
        }
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    /// The bytes covered by the signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        self.render(false)
    }

    /// SHA-256 of the signable bytes: the digest the author signs.
    pub fn signing_digest(&self) -> [u8; 32] {
        ContentHasher::digest(&self.signable_bytes())
    }

    /// Check the embedded signature against the embedded author key.
    pub fn verify(&self) -> SignatureStatus {
        match &self.signature {
            None => SignatureStatus::Unsigned,
            Some(sig) if mgit_crypto::verify(&self.signable_bytes(), sig, &self.author) => {
                SignatureStatus::Verified
            }
            Some(_) => SignatureStatus::Invalid,
        }
    }

    /// Commit id (hash of the framed body, signature included).
    pub fn id(&self) -> ObjectId {
        self.to_stored_object().compute_id()
    }

    /// Convert into a `StoredObject` for storage.
    pub fn to_stored_object(&self) -> StoredObject {
        StoredObject::new(ObjectKind::Commit, self.render(true))
    }

    /// Decode from a `StoredObject`.
    pub fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        obj.expect_kind(ObjectKind::Commit)?;
        let data = obj.data.as_slice();
        let split = data
            .windows(2)
            .position(|w| w == b"\n\n")
            .ok_or_else(|| StoreError::Malformed("commit without header terminator".into()))?;
        let header = std::str::from_utf8(&data[..split])
            .map_err(|_| StoreError::Malformed("commit header is not utf-8".into()))?;
        let message = String::from_utf8(data[split + 2..].to_vec())
            .map_err(|_| StoreError::Malformed("commit message is not utf-8".into()))?;

        let mut lines = header.split('\n').peekable();

        let tree = lines
            .next()
            .and_then(|l| l.strip_prefix("tree "))
            .ok_or_else(|| StoreError::Malformed("commit must start with tree".into()))
            .and_then(parse_id)?;

        let mut parents = Vec::new();
        while let Some(p) = lines.peek().and_then(|l| l.strip_prefix("parent ")) {
            parents.push(parse_id(p)?);
            lines.next();
        }

        let author_line = lines
            .next()
            .and_then(|l| l.strip_prefix("author "))
            .ok_or_else(|| StoreError::Malformed("missing author line".into()))?;
        let mut fields = author_line.split(' ');
        let (Some(pk), Some(ts), Some("+0000"), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(StoreError::Malformed(format!(
                "bad author line {author_line:?}"
            )));
        };
        let author = NostrPubkey::from_hex(pk)
            .map_err(|e| StoreError::Malformed(format!("author key: {e}")))?;
        let timestamp: i64 = ts
            .parse()
            .map_err(|_| StoreError::Malformed(format!("bad timestamp {ts:?}")))?;

        let signature = match lines.next() {
            None => None,
            Some(line) => {
                let hex = line
                    .strip_prefix("nostrsig ")
                    .ok_or_else(|| StoreError::Malformed(format!("unexpected line {line:?}")))?;
                Some(
                    Signature::from_hex(hex)
                        .map_err(|e| StoreError::Malformed(format!("signature: {e}")))?,
                )
            }
        };
        if let Some(extra) = lines.next() {
            return Err(StoreError::Malformed(format!("unexpected line {extra:?}")));
        }

        Ok(Self {
            tree,
            parents,
            author,
            timestamp,
            message,
            signature,
        })
    }
}

fn parse_id(hex: &str) -> StoreResult<ObjectId> {
    ObjectId::from_hex(hex).map_err(|e| StoreError::Malformed(format!("object id: {e}")))
}
