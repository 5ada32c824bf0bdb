use crate::config::ServerConfig;
use crate::error::ServerResult;
use artdeco::ItemRepository;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Item repository (shared across requests)
    pub repository: Arc<ItemRepository>,
}

impl ServerState {
    /// Open the configured repository and wrap it for sharing.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let repo_config = config.repository()?;
        let repository = ItemRepository::open(repo_config)?;
        Ok(Self::with_repository(config, repository))
    }

    /// Build state around an already opened repository.
    pub fn with_repository(config: ServerConfig, repository: ItemRepository) -> Self {
        Self {
            config: Arc::new(config),
            repository: Arc::new(repository),
        }
    }
}
