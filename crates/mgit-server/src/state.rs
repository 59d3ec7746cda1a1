use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::ServerConfig;
use crate::registry::RepoRegistry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<RepoRegistry>,
    pub auth: Arc<dyn AuthProvider>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        registry: RepoRegistry,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            auth,
        }
    }
}
