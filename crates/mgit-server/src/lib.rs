//! Reference server for MGit repositories.
//!
//! Hosts named repositories over HTTP. Each repository endpoint exchanges
//! framed protocol messages, and every ref update is checked for
//! fast-forward and applied by compare-and-swap on the server.

pub mod auth;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod router;
pub mod server;
pub mod state;

pub use auth::{Action, AllowAllAuth, AuthProvider, Credentials, Identity, TokenAuth};
pub use config::{ServerConfig, TokenConfig};
pub use error::{ServerError, ServerResult};
pub use registry::RepoRegistry;
pub use server::MgitServer;
pub use state::AppState;
