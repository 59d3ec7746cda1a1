//! Wire protocol for MGit remotes.
//!
//! Defines the framing, message types, and endpoint paths shared by the
//! HTTP transport in `mgit-sync` and the reference server. Objects travel
//! as `{id, bytes}` pairs of framed Git-style objects; ref updates carry
//! the expected old value so the server can compare-and-swap.

pub mod auth;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod message;

pub use auth::AuthMethod;
pub use codec::MgitCodec;
pub use endpoint::{endpoints, HealthResponse, ServerInfo, CONTENT_TYPE};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{
    capabilities, MgitMessage, ObjectPayload, RefUpdateResult, MAX_BATCH_BYTES,
    MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
