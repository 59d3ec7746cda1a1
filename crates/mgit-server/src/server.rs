use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::auth::{AuthProvider, TokenAuth};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::RepoRegistry;
use crate::router::build_router;
use crate::state::AppState;

/// MGit repository server.
pub struct MgitServer {
    state: AppState,
}

impl MgitServer {
    /// A server authenticating with the config's token table.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let auth = Arc::new(TokenAuth::new(&config.tokens, config.allow_anonymous_read));
        Self::with_auth(config, auth)
    }

    pub fn with_auth(config: ServerConfig, auth: Arc<dyn AuthProvider>) -> ServerResult<Self> {
        let registry = match &config.repos_root {
            Some(root) => RepoRegistry::on_disk(root)?,
            None => RepoRegistry::in_memory(),
        };
        Ok(Self {
            state: AppState::new(config, registry, auth),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn registry(&self) -> &Arc<RepoRegistry> {
        &self.state.registry
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Bind the configured address and serve until the task is dropped.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> ServerResult<()> {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(
            %addr,
            repos_root = ?self.state.config.repos_root,
            tokens = self.state.config.tokens.len(),
            "mgit server listening"
        );
        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
