//! Approximate Nearest Neighbor (ANN) acceleration using the HNSW algorithm.
//!
//! [`crate::VectorIndex`] answers every query with an exact scan unless ANN is
//! enabled and the index holds at least [`AnnConfig::min_vectors_for_ann`]
//! vectors. Past that point a Hierarchical Navigable Small World graph gives
//! sub-linear search (~O(log n)) instead of O(n).
//!
//! ## Trade-offs
//!
//! - **Speed**: ~100-1000x faster than linear scan for large datasets
//! - **Recall**: Typically 95-99% (some true nearest neighbors can be missed)
//! - **Memory**: The graph is held next to the raw vectors
//!
//! ## Incremental maintenance
//!
//! The graph grows incrementally on upsert. HNSW has no deletion, so removed
//! and replaced vectors leave tombstoned slots that are filtered at query
//! time; the graph is rebuilt from live vectors once tombstones exceed
//! [`AnnConfig::max_tombstone_ratio`] or the graph reaches its capacity.
//! Candidates are always re-scored exactly, so ANN only affects which
//! vectors are considered, never their scores or order.

use hnsw_rs::prelude::*;

/// Configuration for ANN acceleration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    /// Default: 16
    pub m: usize,
    /// Size of dynamic candidate list during construction (higher = better recall, slower build).
    /// Default: 200
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search (higher = better recall, slower search).
    /// Default: 64
    pub ef_search: usize,
    /// Whether to use ANN at all. Default: false (exact scan only).
    pub enabled: bool,
    /// Minimum number of vectors before ANN is used.
    /// Below this threshold, linear scan is used even if enabled=true.
    /// Default: 1000
    pub min_vectors_for_ann: usize,
    /// Fraction of tombstoned graph slots that triggers a rebuild.
    /// Default: 0.25
    pub max_tombstone_ratio: f32,
    /// Candidates fetched from the graph per requested result.
    /// Default: 4
    pub oversample: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            enabled: false,
            min_vectors_for_ann: 1000,
            max_tombstone_ratio: 0.25,
            oversample: 4,
        }
    }
}

impl AnnConfig {
    pub fn with_m(mut self, m: usize) -> Self {
        self.m = m;
        self
    }

    pub fn with_ef_construction(mut self, ef: usize) -> Self {
        self.ef_construction = ef;
        self
    }

    pub fn with_ef_search(mut self, ef: usize) -> Self {
        self.ef_search = ef;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_max_tombstone_ratio(mut self, ratio: f32) -> Self {
        self.max_tombstone_ratio = ratio;
        self
    }

    pub fn with_oversample(mut self, oversample: usize) -> Self {
        self.oversample = oversample.max(1);
        self
    }

    /// Check if ANN should be used given the current dataset size.
    pub fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// HNSW graph over slot numbers, with a slot -> id table.
pub(crate) struct AnnGraph {
    hnsw: Hnsw<'static, f32, DistCosine>,
    /// `None` marks a tombstoned slot.
    slots: Vec<Option<String>>,
    tombstones: usize,
    capacity: usize,
}

impl AnnGraph {
    /// Build a graph over the given vectors; slot `i` holds `items[i]`.
    pub(crate) fn build(config: &AnnConfig, items: &[(&str, &Vec<f32>)]) -> Self {
        let capacity = (items.len() * 2).max(1024);
        // HNSW supports at most 16 layers.
        let nb_layer = 16.min(((capacity as f32).ln().trunc() as usize).max(1));

        let hnsw = Hnsw::<f32, DistCosine>::new(
            config.m,
            capacity,
            nb_layer,
            config.ef_construction,
            DistCosine {},
        );

        let data_for_insertion: Vec<(&Vec<f32>, usize)> = items
            .iter()
            .enumerate()
            .map(|(slot, (_, vector))| (*vector, slot))
            .collect();
        hnsw.parallel_insert(&data_for_insertion);

        tracing::debug!(vectors = items.len(), capacity, "built hnsw graph");

        Self {
            hnsw,
            slots: items.iter().map(|(id, _)| Some((*id).to_string())).collect(),
            tombstones: 0,
            capacity,
        }
    }

    /// Add one vector and return its slot.
    pub(crate) fn insert(&mut self, id: &str, vector: &Vec<f32>) -> usize {
        let slot = self.slots.len();
        self.hnsw.parallel_insert(&[(vector, slot)]);
        self.slots.push(Some(id.to_string()));
        slot
    }

    pub(crate) fn tombstone(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            if entry.take().is_some() {
                self.tombstones += 1;
            }
        }
    }

    pub(crate) fn needs_rebuild(&self, config: &AnnConfig) -> bool {
        self.slots.len() >= self.capacity
            || self.tombstones as f32 > config.max_tombstone_ratio * self.slots.len() as f32
    }

    /// Candidate ids for a query, nearest first, tombstones skipped.
    pub(crate) fn candidates(&self, config: &AnnConfig, query: &[f32], k: usize) -> Vec<&str> {
        let fetch = k.saturating_mul(config.oversample).max(k) + self.tombstones.min(k);
        let ef = config.ef_search.max(fetch);
        self.hnsw
            .search(query, fetch, ef)
            .into_iter()
            .filter_map(|neighbour| {
                self.slots
                    .get(neighbour.get_origin_id())
                    .and_then(|slot| slot.as_deref())
            })
            .collect()
    }

    pub(crate) fn live_len(&self) -> usize {
        self.slots.len() - self.tombstones
    }
}
