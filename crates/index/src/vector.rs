use crate::ann::{AnnConfig, AnnGraph};
use crate::IndexError;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One KNN result.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance to the query (0.0 = same direction, lower is closer).
    pub score: f32,
}

/// Config for the vector index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorIndexConfig {
    /// HNSW acceleration settings.
    pub ann: AnnConfig,
    /// Exact scans over at least this many vectors are split across the rayon pool.
    /// Default: 4096
    pub parallel_threshold: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            ann: AnnConfig::default(),
            parallel_threshold: 4096,
        }
    }
}

impl VectorIndexConfig {
    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }
}

struct Entry {
    /// First-insertion order; ties in score are broken by it.
    seq: u64,
    vector: Vec<f32>,
    /// Slot in the current ANN graph, if any.
    slot: Option<usize>,
}

#[derive(Default)]
struct Inner {
    entries: hashbrown::HashMap<String, Entry>,
    next_seq: u64,
    ann: Option<AnnGraph>,
}

/// Scored candidate borrowed from the index during a query.
struct Candidate<'a> {
    id: &'a str,
    seq: u64,
    score: f32,
}

impl Candidate<'_> {
    fn order(a: &Self, b: &Self) -> Ordering {
        a.score.total_cmp(&b.score).then(a.seq.cmp(&b.seq))
    }
}

/// The set of `(id, embedding)` pairs answering top-K cosine queries.
///
/// Upserts and removals are incremental; queries hold a read lock for their
/// whole duration and therefore see one consistent snapshot.
pub struct VectorIndex {
    dimension: usize,
    config: VectorIndexConfig,
    inner: RwLock<Inner>,
}

impl VectorIndex {
    pub fn new(dimension: usize, config: VectorIndexConfig) -> Self {
        Self {
            dimension,
            config,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &VectorIndexConfig {
        &self.config
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace the vector for `id`.
    pub fn upsert(&self, id: &str, vector: &[f32]) -> Result<(), IndexError> {
        self.check_dimension(vector)?;

        let mut guard = self.write();
        let inner = &mut *guard;
        let vector = vector.to_vec();

        let previous = inner.entries.remove(id);
        let seq = match &previous {
            Some(entry) => entry.seq,
            None => {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                seq
            }
        };

        let mut slot = None;
        if let Some(graph) = inner.ann.as_mut() {
            if let Some(old) = previous.as_ref().and_then(|entry| entry.slot) {
                graph.tombstone(old);
            }
            slot = Some(graph.insert(id, &vector));
        }

        inner
            .entries
            .insert(id.to_string(), Entry { seq, vector, slot });
        self.maintain_ann(inner);
        Ok(())
    }

    /// Remove the vector for `id`. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> bool {
        let mut guard = self.write();
        let inner = &mut *guard;
        match inner.entries.remove(id) {
            Some(entry) => {
                if let (Some(graph), Some(slot)) = (inner.ann.as_mut(), entry.slot) {
                    graph.tombstone(slot);
                }
                self.maintain_ann(inner);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Whether queries are currently served through the HNSW graph.
    pub fn ann_active(&self) -> bool {
        self.read().ann.is_some()
    }

    /// Build, rebuild or drop the ANN graph depending on the current size.
    fn maintain_ann(&self, inner: &mut Inner) {
        let ann = &self.config.ann;
        if !ann.should_use_ann(inner.entries.len()) {
            if inner.ann.take().is_some() {
                tracing::debug!(vectors = inner.entries.len(), "dropped hnsw graph");
            }
            return;
        }
        let rebuild = match &inner.ann {
            None => true,
            Some(graph) => graph.needs_rebuild(ann),
        };
        if rebuild {
            Self::rebuild_ann(ann, inner);
        }
    }

    fn rebuild_ann(ann: &AnnConfig, inner: &mut Inner) {
        let mut ordered: Vec<(&String, &Entry)> = inner.entries.iter().collect();
        ordered.sort_unstable_by_key(|(_, entry)| entry.seq);
        let items: Vec<(&str, &Vec<f32>)> = ordered
            .iter()
            .map(|(id, entry)| (id.as_str(), &entry.vector))
            .collect();
        let graph = AnnGraph::build(ann, &items);
        let slots: Vec<String> = ordered.iter().map(|(id, _)| (*id).clone()).collect();

        for (slot, id) in slots.into_iter().enumerate() {
            if let Some(entry) = inner.entries.get_mut(&id) {
                entry.slot = Some(slot);
            }
        }
        tracing::info!(vectors = graph.live_len(), "rebuilt hnsw graph");
        inner.ann = Some(graph);
    }

    /// Return at most `k` nearest vectors ordered by ascending cosine
    /// distance; equal scores keep insertion order.
    pub fn query_knn(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let inner = self.read();
        if inner.entries.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(graph) = inner.ann.as_ref() {
            let wanted = k.min(inner.entries.len());
            let mut candidates: Vec<Candidate<'_>> = graph
                .candidates(&self.config.ann, query, k)
                .into_iter()
                .filter_map(|id| inner.entries.get_key_value(id))
                .map(|(id, entry)| Self::score(query, id, entry))
                .collect();
            candidates.sort_unstable_by(Candidate::order);
            candidates.dedup_by(|a, b| a.id == b.id);
            if candidates.len() >= wanted {
                return Ok(Self::finish(candidates, k));
            }
            tracing::debug!(
                found = candidates.len(),
                wanted,
                "hnsw returned too few live candidates, falling back to scan"
            );
        }

        Ok(Self::finish(self.scan(&inner, query, k), k))
    }

    fn score<'a>(query: &[f32], id: &'a str, entry: &Entry) -> Candidate<'a> {
        Candidate {
            id,
            seq: entry.seq,
            score: cosine_distance(query, &entry.vector),
        }
    }

    /// Exact scan, keeping the `k` best candidates.
    fn scan<'a>(&self, inner: &'a Inner, query: &[f32], k: usize) -> Vec<Candidate<'a>> {
        let mut candidates: Vec<Candidate<'a>> =
            if inner.entries.len() >= self.config.parallel_threshold {
                let entries: Vec<(&'a String, &'a Entry)> = inner.entries.iter().collect();
                entries
                    .par_iter()
                    .map(|(id, entry)| Self::score(query, id.as_str(), entry))
                    .collect()
            } else {
                inner
                    .entries
                    .iter()
                    .map(|(id, entry)| Self::score(query, id.as_str(), entry))
                    .collect()
            };

        if candidates.len() > k {
            candidates.select_nth_unstable_by(k - 1, Candidate::order);
            candidates.truncate(k);
        }
        candidates
    }

    fn finish(mut candidates: Vec<Candidate<'_>>, k: usize) -> Vec<Neighbor> {
        candidates.sort_unstable_by(Candidate::order);
        candidates
            .into_iter()
            .take(k)
            .map(|candidate| Neighbor {
                id: candidate.id.to_string(),
                score: candidate.score,
            })
            .collect()
    }
}

/// Cosine distance (1 - cosine similarity), clamped to `[0, 2]`.
/// Lower values mean vectors are more similar; a zero vector scores 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    let similarity = (dot / (norm_a * norm_b)).clamp(-1.0, 1.0);
    1.0 - similarity
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> VectorIndex {
        VectorIndex::new(3, VectorIndexConfig::default())
    }

    #[test]
    fn test_cosine_distance() {
        let d = cosine_distance(&[1.0, 0.0, 0.0], &[1.0, 0.0, 0.0]);
        assert!(d.abs() < 0.001);

        let d = cosine_distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!((d - 1.0).abs() < 0.001);

        let d = cosine_distance(&[1.0, 0.0, 0.0], &[-1.0, 0.0, 0.0]);
        assert!((d - 2.0).abs() < 0.001);

        assert_eq!(cosine_distance(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0]), 1.0);
    }

    #[test]
    fn query_orders_ascending_by_score() {
        let index = index();
        index.upsert("far", &[0.0, 1.0, 0.0]).unwrap();
        index.upsert("near", &[0.9, 0.1, 0.0]).unwrap();
        index.upsert("exact", &[1.0, 0.0, 0.0]).unwrap();

        let hits = index.query_knn(&[1.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near", "far"]);
        assert!(hits[0].score <= hits[1].score && hits[1].score <= hits[2].score);
    }

    #[test]
    fn query_respects_k() {
        let index = index();
        for i in 0..5 {
            index
                .upsert(&format!("doc{i}"), &[1.0, i as f32, 0.0])
                .unwrap();
        }
        assert_eq!(index.query_knn(&[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
        assert_eq!(index.query_knn(&[1.0, 0.0, 0.0], 10).unwrap().len(), 5);
        assert!(index.query_knn(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let index = index();
        index.upsert("second", &[0.0, 1.0, 0.0]).unwrap();
        index.upsert("first", &[0.0, 0.0, 1.0]).unwrap();
        index.upsert("third", &[0.0, 2.0, 0.0]).unwrap();

        // All three are orthogonal to the query.
        let hits = index.query_knn(&[1.0, 0.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "first", "third"]);

        // Replacing a vector keeps its original position among ties.
        index.upsert("second", &[0.0, 0.0, 5.0]).unwrap();
        let hits = index.query_knn(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].id, "second");
    }

    #[test]
    fn remove_absent_is_noop_and_removed_never_returned() {
        let index = index();
        assert!(!index.remove("ghost"));

        index.upsert("a", &[1.0, 0.0, 0.0]).unwrap();
        index.upsert("b", &[0.8, 0.2, 0.0]).unwrap();
        assert!(index.remove("a"));

        let hits = index.query_knn(&[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }

    #[test]
    fn dimension_is_enforced() {
        let index = index();
        assert!(matches!(
            index.upsert("a", &[1.0, 0.0]),
            Err(IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
        assert!(matches!(
            index.query_knn(&[1.0], 1),
            Err(IndexError::DimensionMismatch { .. })
        ));
        assert!(index.is_empty());
    }

    #[test]
    fn parallel_scan_matches_sequential_scan() {
        let sequential = VectorIndex::new(3, VectorIndexConfig::default());
        let parallel =
            VectorIndex::new(3, VectorIndexConfig::default().with_parallel_threshold(1));
        for i in 0..50 {
            let v = [1.0, (i as f32) * 0.1, (i % 7) as f32];
            sequential.upsert(&format!("v{i}"), &v).unwrap();
            parallel.upsert(&format!("v{i}"), &v).unwrap();
        }
        let query = [1.0, 0.5, 2.0];
        assert_eq!(
            sequential.query_knn(&query, 7).unwrap(),
            parallel.query_knn(&query, 7).unwrap()
        );
    }

    #[test]
    fn ann_path_finds_exact_match_and_skips_removed() {
        let config = VectorIndexConfig::default().with_ann(
            AnnConfig::default()
                .with_enabled(true)
                .with_min_vectors_for_ann(32),
        );
        let index = VectorIndex::new(3, config);
        for i in 0..64 {
            let theta = i as f32 * 0.04;
            index
                .upsert(&format!("v{i}"), &[theta.cos(), theta.sin(), 0.0])
                .unwrap();
        }
        assert!(index.ann_active());

        let hits = index.query_knn(&[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(hits[0].id, "v0");

        index.remove("v0");
        let hits = index.query_knn(&[1.0, 0.0, 0.0], 3).unwrap();
        assert!(hits.iter().all(|hit| hit.id != "v0"));
        assert_eq!(hits.len(), 3);

        // Shrinking below the threshold drops back to exact scan.
        for i in 1..40 {
            index.remove(&format!("v{i}"));
        }
        assert!(!index.ann_active());
        assert_eq!(index.len(), 24);
    }
}
