//! Foundation types for MGit.
//!
//! This crate provides the identifier types shared by every other MGit
//! crate. It has no knowledge of object encodings or signatures.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- Content-addressed identifier (SHA-256 of framed object bytes)
//! - [`NostrPubkey`] -- x-only secp256k1 public key naming a commit author

pub mod error;
pub mod identity;
pub mod object;

pub use error::TypeError;
pub use identity::NostrPubkey;
pub use object::ObjectId;
