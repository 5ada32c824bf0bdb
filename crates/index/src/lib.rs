//! # Art Deco Index
//!
//! Storage and retrieval primitives for artwork records. The crate owns three
//! independently updatable structures:
//!
//! - **Record Store** ([`RecordStore`]): flat field-addressable records kept in
//!   a pluggable [`RecordBackend`]. Out of the box it provides:
//!   - An in-memory `HashMap` backend for fast, ephemeral storage (ideal for testing).
//!   - A redb backend for persistent, on-disk storage (enabled via the `backend-redb` feature).
//! - **Field Index** ([`FieldIndex`]): the text fields of every record, readable
//!   and updatable without touching embedding data, with exact and substring
//!   lookups.
//! - **Vector Index** ([`VectorIndex`]): `(id, embedding)` pairs answering
//!   top-K cosine distance queries. Exact scan is the reference path; an HNSW
//!   graph (see [`ann`]) takes over for large indexes when enabled.
//!
//! The orchestration of the three (identifier policy, validation, write order)
//! lives in the umbrella `artdeco` crate.
//!
//! ## Example Usage
//!
//! ```
//! use index::{BackendConfig, RecordStore, StoredRecord, VectorIndex, VectorIndexConfig};
//!
//! let store = RecordStore::new(BackendConfig::in_memory().build().unwrap());
//! let vectors = VectorIndex::new(3, VectorIndexConfig::default());
//!
//! let record = StoredRecord {
//!     id: "a".into(),
//!     title: "Starry Night".into(),
//!     author: "Vincent van Gogh".into(),
//!     description: "Oil on canvas".into(),
//!     embedding: vec![1.0, 0.0, 0.0],
//!     image: None,
//! };
//! store.put(&record).unwrap();
//! vectors.upsert(&record.id, &record.embedding).unwrap();
//!
//! let hits = vectors.query_knn(&[1.0, 0.0, 0.0], 1).unwrap();
//! assert_eq!(hits[0].id, "a");
//! ```

pub mod ann;
mod backend;
mod field;
mod record;
mod schema;
mod store;
mod vector;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, FieldMap, InMemoryBackend, RecordBackend};
pub use field::{FieldIndex, MatchMode, TextFields};
pub use record::{decode_vector, encode_vector, fields, StoredImage, StoredRecord, TextField};
pub use schema::{DistanceMetric, IndexSchema, SchemaStatus};
pub use store::RecordStore;
pub use vector::{cosine_distance, Neighbor, VectorIndex, VectorIndexConfig};

use thiserror::Error;

/// Number of `f32` components in every artwork embedding.
pub const EMBEDDING_DIM: usize = 512;

/// Custom error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Serialization encode error: {0}")]
    Encode(String),
    #[error("Serialization decode error: {0}")]
    Decode(String),
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Index {name} already exists with an incompatible schema: {reason}")]
    SchemaMismatch { name: String, reason: String },
}

impl From<serde_json::Error> for IndexError {
    fn from(e: serde_json::Error) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}
