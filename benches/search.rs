use artdeco::{ItemInput, ItemRepository, RepositoryConfig, EMBEDDING_DIM};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use index::ann::AnnConfig;
use index::{VectorIndex, VectorIndexConfig};
use rand::distr::StandardUniform;
use rand::Rng;
use std::hint::black_box;

/// Generate a random unit vector
fn random_vector(dim: usize) -> Vec<f32> {
    let rng = rand::rng();
    let v: Vec<f32> = rng
        .sample_iter(StandardUniform)
        .take(dim)
        .map(|x: f32| x - 0.5)
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(f32::EPSILON);
    v.into_iter().map(|x| x / norm).collect()
}

fn to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// Exact scan vs HNSW over the vector index alone
fn bench_vector_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("vector_index");

    for size in [1_000, 10_000].iter() {
        let vectors: Vec<(String, Vec<f32>)> = (0..*size)
            .map(|i| (format!("vec-{i}"), random_vector(EMBEDDING_DIM)))
            .collect();
        let query = random_vector(EMBEDDING_DIM);

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_function(format!("exact_{size}"), |b| {
            let index = VectorIndex::new(EMBEDDING_DIM, VectorIndexConfig::default());
            for (id, v) in &vectors {
                index.upsert(id, v).unwrap();
            }
            b.iter(|| index.query_knn(black_box(&query), black_box(10)).unwrap());
        });

        group.bench_function(format!("hnsw_{size}"), |b| {
            let config = VectorIndexConfig::default().with_ann(
                AnnConfig::default()
                    .with_enabled(true)
                    .with_min_vectors_for_ann(100),
            );
            let index = VectorIndex::new(EMBEDDING_DIM, config);
            for (id, v) in &vectors {
                index.upsert(id, v).unwrap();
            }
            b.iter(|| index.query_knn(black_box(&query), black_box(10)).unwrap());
        });
    }

    group.finish();
}

/// Repository search including validation and hydration
fn bench_repository_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("repository");
    let repo = ItemRepository::open(RepositoryConfig::default()).expect("open repository");
    for i in 0..5_000 {
        let input = ItemInput::new(
            format!("Artwork {i}"),
            "Bench Artist",
            "",
            to_bytes(&random_vector(EMBEDDING_DIM)),
        );
        repo.add(input).expect("add");
    }
    let query = to_bytes(&random_vector(EMBEDDING_DIM));

    for k in [1, 5, 25].iter() {
        group.bench_function(format!("search_k{k}"), |b| {
            b.iter(|| repo.search(black_box(&query), black_box(*k)).unwrap())
        });
    }

    group.bench_function("add", |b| {
        let embedding = to_bytes(&random_vector(EMBEDDING_DIM));
        b.iter(|| {
            repo.add(ItemInput::new("Bench", "Bench Artist", "", embedding.clone()))
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(benches, bench_vector_index, bench_repository_search);
criterion_main!(benches);
