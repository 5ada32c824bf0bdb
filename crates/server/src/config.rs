use artdeco::{ArtDecoConfig, BackendConfig, RepositoryConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Origins allowed by CORS
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional repository YAML file; storage and search fields below override it
    #[serde(default)]
    pub repository_config: Option<String>,

    /// Storage backend: "in_memory" or "redb"
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// Database file for the redb backend
    #[serde(default = "default_storage_path")]
    pub storage_path: String,

    /// Results returned by a search without `k`
    #[serde(default)]
    pub default_k: Option<usize>,

    /// Largest `k` a search may ask for
    #[serde(default)]
    pub max_k: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            cors_origins: default_cors_origins(),
            log_level: default_log_level(),
            repository_config: None,
            storage_backend: default_storage_backend(),
            storage_path: default_storage_path(),
            default_k: None,
            max_k: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `server` config file and
    /// `ARTDECO_SERVER__*` environment variables, in increasing precedence.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }

        let builder = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::with_name("server").required(false))
            // Override with environment variables
            .add_source(
                config::Environment::with_prefix("ARTDECO_SERVER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cors_origins")
                    .try_parsing(true),
            );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }

    /// Build the repository configuration this server runs with.
    pub fn repository(&self) -> anyhow::Result<RepositoryConfig> {
        let mut repo = match &self.repository_config {
            Some(path) => ArtDecoConfig::from_file(path)?.repository_config(),
            None => RepositoryConfig::default(),
        };

        repo.backend = match self.storage_backend.as_str() {
            "redb" => BackendConfig::redb(self.storage_path.clone()),
            "in_memory" => BackendConfig::in_memory(),
            other => anyhow::bail!("unknown storage backend: {other}"),
        };
        if let Some(max_k) = self.max_k {
            repo.max_k = max_k;
        }
        if let Some(k) = self.default_k {
            repo.default_k = k;
        }
        if repo.default_k == 0 || repo.default_k > repo.max_k {
            anyhow::bail!(
                "default_k ({}) must be between 1 and max_k ({})",
                repo.default_k,
                repo.max_k
            );
        }
        // Images arrive inside multipart bodies.
        repo.max_image_bytes = repo.max_image_bytes.min(self.max_body_size());
        Ok(repo)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_storage_backend() -> String {
    "redb".to_string()
}

fn default_storage_path() -> String {
    "artdeco.redb".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 8000);
        assert_eq!(cfg.timeout_secs, 30);
        assert_eq!(cfg.max_body_size_mb, 10);
        assert_eq!(
            cfg.cors_origins,
            vec!["http://localhost:5173", "http://127.0.0.1:5173"]
        );
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn test_repository_overrides() {
        let cfg = ServerConfig {
            storage_backend: "in_memory".into(),
            default_k: Some(4),
            max_k: Some(20),
            ..Default::default()
        };
        let repo = cfg.repository().unwrap();
        assert_eq!(repo.backend, BackendConfig::in_memory());
        assert_eq!(repo.default_k, 4);
        assert_eq!(repo.max_k, 20);

        let cfg = ServerConfig {
            storage_backend: "postgres".into(),
            ..Default::default()
        };
        assert!(cfg.repository().is_err());

        let cfg = ServerConfig {
            default_k: Some(50),
            max_k: Some(10),
            ..Default::default()
        };
        assert!(cfg.repository().is_err());
    }
}
