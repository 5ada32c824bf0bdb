//! Repository configuration and its YAML file form.
//!
//! [`RepositoryConfig`] is what [`crate::ItemRepository::open`] takes. It can
//! be built in code or loaded from a YAML file through [`ArtDecoConfig`].
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! # Art Deco repository configuration
//! version: "1.0"
//!
//! storage:
//!   backend: "redb"
//!   path: "data/artdeco.redb"
//!
//! search:
//!   default_k: 5
//!   max_k: 100
//!   parallel_threshold: 4096
//!   ann:
//!     enabled: false
//!     min_vectors_for_ann: 1000
//!
//! images:
//!   max_bytes: 10485760
//!   allowed_content_types: ["image/jpeg", "image/png", "image/webp", "image/gif"]
//!
//! lock_stripes: 64
//! ```

use std::fs;
use std::path::Path;

use index::ann::AnnConfig;
use index::{BackendConfig, VectorIndexConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of search results.
pub const DEFAULT_K: usize = 5;
/// Upper bound accepted for `k`.
pub const DEFAULT_MAX_K: usize = 100;
/// Default image size limit (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_CONTENT_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Settings for an [`crate::ItemRepository`].
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryConfig {
    pub backend: BackendConfig,
    pub vector: VectorIndexConfig,
    /// `k` used by [`crate::ItemRepository::search_default`].
    pub default_k: usize,
    /// Largest `k` a search may ask for.
    pub max_k: usize,
    pub max_image_bytes: usize,
    /// Accepted image media types, lowercase, without parameters.
    pub allowed_content_types: Vec<String>,
    /// Number of per-id mutation lock stripes.
    pub lock_stripes: usize,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            vector: VectorIndexConfig::default(),
            default_k: DEFAULT_K,
            max_k: DEFAULT_MAX_K,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            allowed_content_types: DEFAULT_CONTENT_TYPES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lock_stripes: 64,
        }
    }
}

impl RepositoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_vector(mut self, vector: VectorIndexConfig) -> Self {
        self.vector = vector;
        self
    }

    pub fn with_default_k(mut self, k: usize) -> Self {
        self.default_k = k;
        self
    }

    pub fn with_max_k(mut self, max_k: usize) -> Self {
        self.max_k = max_k;
        self
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    pub fn with_allowed_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_content_types = types
            .into_iter()
            .map(|t| t.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes.max(1);
        self
    }
}

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtDecoConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub storage: StorageYamlConfig,

    #[serde(default)]
    pub search: SearchYamlConfig,

    #[serde(default)]
    pub images: ImageYamlConfig,

    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
}

impl ArtDecoConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: ArtDecoConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.storage.validate()?;
        self.search.validate()?;
        self.images.validate()?;

        if self.lock_stripes == 0 {
            return Err(ConfigLoadError::Validation(
                "lock_stripes must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Turn the file form into the runtime configuration.
    pub fn repository_config(&self) -> RepositoryConfig {
        let backend = match (self.storage.backend.as_str(), &self.storage.path) {
            ("redb", Some(path)) => BackendConfig::redb(path.clone()),
            _ => BackendConfig::in_memory(),
        };
        RepositoryConfig::new()
            .with_backend(backend)
            .with_vector(self.search.vector_config())
            .with_default_k(self.search.default_k)
            .with_max_k(self.search.max_k)
            .with_max_image_bytes(self.images.max_bytes)
            .with_allowed_content_types(self.images.allowed_content_types.iter().cloned())
            .with_lock_stripes(self.lock_stripes)
    }
}

impl Default for ArtDecoConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            storage: StorageYamlConfig::default(),
            search: SearchYamlConfig::default(),
            images: ImageYamlConfig::default(),
            lock_stripes: default_lock_stripes(),
        }
    }
}

/// Storage YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageYamlConfig {
    #[serde(default = "default_backend")]
    pub backend: String,

    #[serde(default)]
    pub path: Option<String>,
}

impl StorageYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "storage.backend must be one of: {valid_backends:?}"
            )));
        }

        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "storage.path is required when backend is 'redb'".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for StorageYamlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
        }
    }
}

/// Search YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchYamlConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,

    #[serde(default = "default_max_k")]
    pub max_k: usize,

    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    #[serde(default)]
    pub ann: AnnYamlConfig,
}

impl SearchYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_k == 0 {
            return Err(ConfigLoadError::Validation(
                "search.max_k must be >= 1".to_string(),
            ));
        }
        if self.default_k == 0 || self.default_k > self.max_k {
            return Err(ConfigLoadError::Validation(format!(
                "search.default_k must be between 1 and max_k ({})",
                self.max_k
            )));
        }
        self.ann.validate()
    }

    fn vector_config(&self) -> VectorIndexConfig {
        VectorIndexConfig::default()
            .with_parallel_threshold(self.parallel_threshold)
            .with_ann(self.ann.ann_config())
    }
}

impl Default for SearchYamlConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
            parallel_threshold: default_parallel_threshold(),
            ann: AnnYamlConfig::default(),
        }
    }
}

/// HNSW YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnYamlConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_m")]
    pub m: usize,

    #[serde(default = "default_ef_construction")]
    pub ef_construction: usize,

    #[serde(default = "default_ef_search")]
    pub ef_search: usize,

    #[serde(default = "default_min_vectors_for_ann")]
    pub min_vectors_for_ann: usize,

    #[serde(default = "default_max_tombstone_ratio")]
    pub max_tombstone_ratio: f32,

    #[serde(default = "default_oversample")]
    pub oversample: usize,
}

impl AnnYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.m == 0 || self.ef_construction == 0 || self.ef_search == 0 {
            return Err(ConfigLoadError::Validation(
                "search.ann.m, ef_construction and ef_search must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_tombstone_ratio) {
            return Err(ConfigLoadError::Validation(
                "search.ann.max_tombstone_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    fn ann_config(&self) -> AnnConfig {
        AnnConfig::default()
            .with_enabled(self.enabled)
            .with_m(self.m)
            .with_ef_construction(self.ef_construction)
            .with_ef_search(self.ef_search)
            .with_min_vectors_for_ann(self.min_vectors_for_ann)
            .with_max_tombstone_ratio(self.max_tombstone_ratio)
            .with_oversample(self.oversample)
    }
}

impl Default for AnnYamlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            m: default_m(),
            ef_construction: default_ef_construction(),
            ef_search: default_ef_search(),
            min_vectors_for_ann: default_min_vectors_for_ann(),
            max_tombstone_ratio: default_max_tombstone_ratio(),
            oversample: default_oversample(),
        }
    }
}

/// Image upload YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageYamlConfig {
    #[serde(default = "default_max_image_bytes")]
    pub max_bytes: usize,

    #[serde(default = "default_content_types")]
    pub allowed_content_types: Vec<String>,
}

impl ImageYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_bytes == 0 {
            return Err(ConfigLoadError::Validation(
                "images.max_bytes must be >= 1".to_string(),
            ));
        }
        if self.allowed_content_types.is_empty() {
            return Err(ConfigLoadError::Validation(
                "images.allowed_content_types must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ImageYamlConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_image_bytes(),
            allowed_content_types: default_content_types(),
        }
    }
}

// Helper functions for serde defaults
fn default_backend() -> String {
    "in_memory".to_string()
}
fn default_k() -> usize {
    DEFAULT_K
}
fn default_max_k() -> usize {
    DEFAULT_MAX_K
}
fn default_parallel_threshold() -> usize {
    VectorIndexConfig::default().parallel_threshold
}
fn default_m() -> usize {
    AnnConfig::default().m
}
fn default_ef_construction() -> usize {
    AnnConfig::default().ef_construction
}
fn default_ef_search() -> usize {
    AnnConfig::default().ef_search
}
fn default_min_vectors_for_ann() -> usize {
    AnnConfig::default().min_vectors_for_ann
}
fn default_max_tombstone_ratio() -> f32 {
    AnnConfig::default().max_tombstone_ratio
}
fn default_oversample() -> usize {
    AnnConfig::default().oversample
}
fn default_max_image_bytes() -> usize {
    DEFAULT_MAX_IMAGE_BYTES
}
fn default_content_types() -> Vec<String> {
    DEFAULT_CONTENT_TYPES.iter().map(|s| s.to_string()).collect()
}
fn default_lock_stripes() -> usize {
    64
}
