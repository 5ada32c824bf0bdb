//! Art Deco: an artwork item store with cosine similarity search.
//!
//! Items carry a title, an author, a description (free text or a source URL),
//! an optional image and a 512-dimension embedding produced externally.
//! [`ItemRepository`] offers whole-item and per-field CRUD plus top-K search
//! over embeddings, on top of the record store and indexes of the `index`
//! crate.
//!
//! Embeddings cross the repository API as raw little-endian `f32` bytes
//! (exactly 2048 of them) and cross the wire as base64 of those bytes; see
//! [`Embedding`].

pub mod config;
pub mod embedding;
mod error;
pub mod id;
mod item;
mod metrics;
mod repository;

pub use config::{ArtDecoConfig, ConfigLoadError, RepositoryConfig};
pub use embedding::{Embedding, EMBEDDING_BYTES};
pub use error::{RepositoryError, RepositoryResult, ValidationError};
pub use item::{Image, Item, ItemInput, RepositoryStats, SearchHit};
pub use metrics::{Operation, RepositoryMetrics};
pub use repository::ItemRepository;

pub use index::{BackendConfig, IndexError, MatchMode, TextField, EMBEDDING_DIM};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingMetrics {
        events: RwLock<Vec<(&'static str, bool)>>,
    }

    impl CountingMetrics {
        fn snapshot(&self) -> Vec<(&'static str, bool)> {
            self.events.read().unwrap().clone()
        }
    }

    impl RepositoryMetrics for CountingMetrics {
        fn record(
            &self,
            operation: Operation,
            _latency: Duration,
            result: Result<(), RepositoryError>,
        ) {
            self.events
                .write()
                .unwrap()
                .push((operation.as_str(), result.is_ok()));
        }
    }

    fn unit_bytes(axis: usize) -> Vec<u8> {
        let mut v = vec![0f32; EMBEDDING_DIM];
        v[axis] = 1.0;
        index::encode_vector(&v)
    }

    #[test]
    fn metrics_recorder_tracks_operation_outcome() {
        let metrics = Arc::new(CountingMetrics::default());
        let repo = ItemRepository::open(RepositoryConfig::default())
            .unwrap()
            .with_metrics(metrics.clone());

        let item = repo
            .add(ItemInput::new("The Kiss", "Gustav Klimt", "", unit_bytes(1)))
            .unwrap();
        assert!(repo.get("missing").unwrap().is_none());
        assert!(repo.search(&unit_bytes(1), 0).is_err());
        repo.delete(&item.id).unwrap();

        assert_eq!(
            metrics.snapshot(),
            vec![
                ("add", true),
                ("get", true),
                ("search", false),
                ("delete", true)
            ]
        );
    }
}
