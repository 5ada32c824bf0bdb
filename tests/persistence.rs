//! Reopening repositories over the redb backend.

#![cfg(feature = "backend-redb")]

use artdeco::{
    BackendConfig, Image, IndexError, ItemInput, ItemRepository, RepositoryConfig,
    RepositoryError, EMBEDDING_DIM,
};
use index::{IndexSchema, RecordStore, StoredRecord};
use tempfile::TempDir;

fn unit(axis: usize) -> Vec<u8> {
    let mut v = vec![0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn config(dir: &TempDir) -> RepositoryConfig {
    let path = dir.path().join("items.redb");
    RepositoryConfig::default().with_backend(BackendConfig::redb(path.to_string_lossy()))
}

#[test]
fn reopen_restores_records_and_indexes() {
    let dir = TempDir::new().unwrap();

    let (kept, removed) = {
        let repo = ItemRepository::open(config(&dir)).unwrap();
        let kept = repo
            .add(
                ItemInput::new("The Persistence of Memory", "Salvador Dalí", "", unit(4))
                    .with_image(Image::new(vec![1, 2, 3, 4], "image/gif")),
            )
            .unwrap();
        let removed = repo
            .add(ItemInput::new("Swans Reflecting Elephants", "Salvador Dalí", "", unit(5)))
            .unwrap();
        repo.update_title(&kept.id, "Persistence of Memory").unwrap();
        repo.delete(&removed.id).unwrap();
        repo.close().unwrap();
        (kept, removed)
    };

    let repo = ItemRepository::open(config(&dir)).unwrap();
    assert_eq!(repo.stats().items, 1);
    assert_eq!(repo.stats().vectors, 1);

    let item = repo.get(&kept.id).unwrap().unwrap();
    assert_eq!(item.title, "Persistence of Memory");
    assert_eq!(repo.get_title(&kept.id).unwrap().unwrap(), "Persistence of Memory");
    assert_eq!(
        repo.get_image(&kept.id).unwrap().unwrap().content_type,
        "image/gif"
    );
    assert!(repo.get(&removed.id).unwrap().is_none());

    let hits = repo.search(&unit(4), 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, kept.id);
}

#[test]
fn incompatible_schema_fails_at_open() {
    let dir = TempDir::new().unwrap();
    {
        let store = RecordStore::open(&config(&dir).backend).unwrap();
        store
            .declare_schema(&IndexSchema::items().with_dimension(768))
            .unwrap();
    }

    match ItemRepository::open(config(&dir)) {
        Err(RepositoryError::StoreUnavailable(IndexError::SchemaMismatch { name, reason })) => {
            assert_eq!(name, "idx:items");
            assert!(reason.contains("768"));
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("open should fail on an incompatible schema"),
    }
}

#[test]
fn malformed_stored_embedding_is_skipped_on_rebuild() {
    let store = RecordStore::open(&BackendConfig::in_memory()).unwrap();
    store
        .put(&StoredRecord {
            id: "legacy".into(),
            title: "Old Record".into(),
            author: "Unknown".into(),
            description: String::new(),
            embedding: vec![1.0, 0.0, 0.0],
            image: None,
        })
        .unwrap();

    let repo = ItemRepository::with_store(store, RepositoryConfig::default()).unwrap();
    assert_eq!(repo.stats().items, 1);
    assert_eq!(repo.stats().vectors, 0);
    assert_eq!(repo.get_title("legacy").unwrap().unwrap(), "Old Record");
    assert!(repo.search(&unit(0), 5).unwrap().is_empty());
}
