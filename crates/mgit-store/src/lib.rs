//! Content-addressed object storage for MGit.
//!
//! This crate implements a hash-keyed object store analogous to git's
//! `.git/objects/` directory, using Git's object framing with SHA-256 ids.
//! Every piece of versioned data (file contents, directory listings, signed
//! commits) is stored as an immutable object identified by the SHA-256 of
//! its framed bytes.
//!
//! # Object Types
//!
//! - [`Blob`] -- raw content (file contents, arbitrary data)
//! - [`Tree`] -- directory listing mapping names to object references
//! - [`Commit`] -- tree snapshot + parents + Nostr-signed authorship
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose objects on disk, atomically renamed into place
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written (content-addressing guarantees this).
//! 2. Reads re-verify the hash; corruption surfaces as `IntegrityError`.
//! 3. Concurrent reads are always safe.
//! 4. The store never retries and never repairs.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{
    validate_entry_name, Blob, Commit, EntryMode, ObjectKind, SignatureStatus, StoredObject,
    Tree, TreeEntry,
};
pub use traits::ObjectStore;
