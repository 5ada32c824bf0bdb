use crate::config::RepositoryConfig;
use crate::embedding::Embedding;
use crate::error::{RepositoryError, RepositoryResult, ValidationError};
use crate::id::generate_id;
use crate::item::{Image, Item, ItemInput, RepositoryStats, SearchHit};
use crate::metrics::{MetricsSpan, Operation, RepositoryMetrics};
use index::{
    FieldIndex, IndexError, IndexSchema, MatchMode, RecordStore, StoredImage, StoredRecord,
    TextField, TextFields, VectorIndex, EMBEDDING_DIM,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

/// CRUD and similarity search over artwork items.
///
/// Composes the Record Store (source of truth), the Field Index and the
/// Vector Index. Mutations of one id are serialized through a striped lock;
/// mutations of different ids and all reads run in parallel.
///
/// Every mutation commits to the store before the indexes follow. Text reads
/// go through the store, and search and find drop hits the store no longer
/// holds, so a failed write never leaves a partially visible item.
///
/// ```
/// use artdeco::{ItemInput, ItemRepository, RepositoryConfig};
///
/// let repo = ItemRepository::open(RepositoryConfig::default()).unwrap();
/// let mut embedding = vec![0f32; 512];
/// embedding[0] = 1.0;
/// let bytes: Vec<u8> = embedding.iter().flat_map(|v| v.to_le_bytes()).collect();
///
/// let item = repo
///     .add(ItemInput::new("Starry Night", "Vincent van Gogh", "", bytes.clone()))
///     .unwrap();
/// let hits = repo.search(&bytes, 1).unwrap();
/// assert_eq!(hits[0].item.id, item.id);
/// ```
pub struct ItemRepository {
    store: RecordStore,
    fields: FieldIndex,
    vectors: VectorIndex,
    config: RepositoryConfig,
    stripes: Box<[Mutex<()>]>,
    metrics: Option<Arc<dyn RepositoryMetrics>>,
}

/// Validated content of an add or full update, before an id is attached.
struct Draft {
    title: String,
    author: String,
    description: String,
    embedding: Embedding,
    image: Option<StoredImage>,
}

impl Draft {
    fn into_record(self, id: String) -> StoredRecord {
        StoredRecord {
            id,
            title: self.title,
            author: self.author,
            description: self.description,
            embedding: self.embedding.into_vec(),
            image: self.image,
        }
    }
}

impl ItemRepository {
    /// Open the configured backend, declare the index schema and rebuild the
    /// in-memory indexes from the stored records.
    pub fn open(config: RepositoryConfig) -> RepositoryResult<Self> {
        let store = RecordStore::open(&config.backend)?;
        Self::with_store(store, config)
    }

    /// Same as [`ItemRepository::open`] over an already opened store.
    pub fn with_store(store: RecordStore, config: RepositoryConfig) -> RepositoryResult<Self> {
        let schema = IndexSchema::items();
        let status = store.declare_schema(&schema)?;

        let repo = Self {
            store,
            fields: FieldIndex::new(),
            vectors: VectorIndex::new(schema.dimension, config.vector),
            stripes: (0..config.lock_stripes.max(1))
                .map(|_| Mutex::new(()))
                .collect(),
            config,
            metrics: None,
        };
        repo.rebuild_indexes()?;

        tracing::info!(
            schema = ?status,
            items = repo.fields.len(),
            vectors = repo.vectors.len(),
            ann = repo.vectors.ann_active(),
            "opened item repository"
        );
        Ok(repo)
    }

    /// Report latency and outcome of every operation to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn RepositoryMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Flush the backend and release the repository.
    pub fn close(self) -> RepositoryResult<()> {
        self.store.flush()?;
        tracing::info!(items = self.fields.len(), "closed item repository");
        Ok(())
    }

    fn rebuild_indexes(&self) -> Result<(), IndexError> {
        let mut skipped = 0usize;
        self.store.scan(&mut |record| {
            self.fields.upsert(&record.id, text_fields(&record));
            if record.embedding.len() == EMBEDDING_DIM {
                self.vectors.upsert(&record.id, &record.embedding)?;
            } else {
                skipped += 1;
                tracing::warn!(
                    id = %record.id,
                    len = record.embedding.len(),
                    "stored embedding has the wrong length; item is not searchable"
                );
            }
            Ok(())
        })?;
        if skipped > 0 {
            tracing::warn!(skipped, "some items were left out of the vector index");
        }
        Ok(())
    }

    fn stripe(&self, id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe(id)]
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn observe<T>(
        &self,
        operation: Operation,
        f: impl FnOnce() -> RepositoryResult<T>,
    ) -> RepositoryResult<T> {
        let span = MetricsSpan::start(self.metrics.as_ref(), operation);
        let result = f();
        if let Some(span) = span {
            span.finish(&result);
        }
        result
    }

    // Write order: store, field index, vector index.
    fn write_record(&self, record: &StoredRecord) -> Result<(), IndexError> {
        self.store.put(record)?;
        self.fields.upsert(&record.id, text_fields(record));
        self.vectors.upsert(&record.id, &record.embedding)
    }

    /// Create an item under a fresh identifier.
    pub fn add(&self, input: ItemInput) -> RepositoryResult<Item> {
        self.observe(Operation::Add, || {
            let draft = self.validate_input(input)?;
            let id = generate_id();
            let _guard = self.lock(&id);
            let record = draft.into_record(id);
            self.write_record(&record)?;
            tracing::debug!(id = %record.id, "added item");
            Ok(Item::from(&record))
        })
    }

    pub fn get(&self, id: &str) -> RepositoryResult<Option<Item>> {
        self.observe(Operation::Get, || {
            Ok(self.store.get(id)?.as_ref().map(Item::from))
        })
    }

    /// Read one text field without touching the rest of the record.
    pub fn get_text(&self, id: &str, field: TextField) -> RepositoryResult<Option<String>> {
        self.observe(Operation::GetField, || Ok(self.store.get_text(id, field)?))
    }

    pub fn get_title(&self, id: &str) -> RepositoryResult<Option<String>> {
        self.get_text(id, TextField::Title)
    }

    pub fn get_author(&self, id: &str) -> RepositoryResult<Option<String>> {
        self.get_text(id, TextField::Author)
    }

    pub fn get_description(&self, id: &str) -> RepositoryResult<Option<String>> {
        self.get_text(id, TextField::Description)
    }

    /// The stored embedding; serialize it for the base64 transport form.
    pub fn get_embedding(&self, id: &str) -> RepositoryResult<Option<Embedding>> {
        self.observe(Operation::GetField, || match self.store.get_embedding(id)? {
            Some(values) => Embedding::from_vec(values).map(Some).map_err(|e| {
                RepositoryError::from(IndexError::Decode(format!(
                    "stored embedding of {id}: {e}"
                )))
            }),
            None => Ok(None),
        })
    }

    /// The image payload; `None` when the item is unknown or has no image.
    pub fn get_image(&self, id: &str) -> RepositoryResult<Option<Image>> {
        self.observe(Operation::GetField, || {
            Ok(self.store.get_image(id)?.map(Image::from))
        })
    }

    /// Replace every field of an existing item. Unknown ids are not created.
    pub fn update(&self, id: &str, input: ItemInput) -> RepositoryResult<Option<Item>> {
        self.observe(Operation::Update, || {
            let draft = self.validate_input(input)?;
            let _guard = self.lock(id);
            if !self.store.exists(id)? {
                return Ok(None);
            }
            let record = draft.into_record(id.to_string());
            self.write_record(&record)?;
            tracing::debug!(id, "replaced item");
            Ok(Some(Item::from(&record)))
        })
    }

    /// Replace one text field; the embedding and the other fields are untouched.
    pub fn update_text(
        &self,
        id: &str,
        field: TextField,
        value: &str,
    ) -> RepositoryResult<Option<String>> {
        self.observe(Operation::UpdateField, || {
            validate_text(field, value)?;
            let _guard = self.lock(id);
            let Some(updated) = self.store.set_text(id, field, value)? else {
                return Ok(None);
            };
            if !self.fields.set(id, field, &updated) {
                tracing::warn!(id, %field, "item missing from field index during update");
            }
            tracing::debug!(id, %field, "updated item field");
            Ok(Some(updated))
        })
    }

    pub fn update_title(&self, id: &str, title: &str) -> RepositoryResult<Option<String>> {
        self.update_text(id, TextField::Title, title)
    }

    pub fn update_author(&self, id: &str, author: &str) -> RepositoryResult<Option<String>> {
        self.update_text(id, TextField::Author, author)
    }

    pub fn update_description(
        &self,
        id: &str,
        description: &str,
    ) -> RepositoryResult<Option<String>> {
        self.update_text(id, TextField::Description, description)
    }

    /// Replace only the embedding (raw little-endian bytes) and its vector index entry.
    pub fn update_embedding(
        &self,
        id: &str,
        embedding: &[u8],
    ) -> RepositoryResult<Option<Embedding>> {
        self.observe(Operation::UpdateField, || {
            let embedding = Embedding::from_le_bytes(embedding)?;
            let _guard = self.lock(id);
            if !self.store.set_embedding(id, embedding.as_slice())? {
                return Ok(None);
            }
            self.vectors.upsert(id, embedding.as_slice())?;
            tracing::debug!(id, "updated item embedding");
            Ok(Some(embedding))
        })
    }

    /// Replace the image payload and its content type together.
    pub fn update_image(&self, id: &str, image: Image) -> RepositoryResult<Option<Image>> {
        self.observe(Operation::UpdateField, || {
            let image = self.validate_image(image)?;
            let _guard = self.lock(id);
            if !self.store.set_image(id, &image)? {
                return Ok(None);
            }
            tracing::debug!(id, bytes = image.bytes.len(), "updated item image");
            Ok(Some(Image::from(image)))
        })
    }

    /// Remove an item everywhere. Returns the deleted id, or `None` if unknown.
    pub fn delete(&self, id: &str) -> RepositoryResult<Option<String>> {
        self.observe(Operation::Delete, || {
            let _guard = self.lock(id);
            // The store is the commit point; index hits it no longer holds are dropped.
            if !self.store.delete(id)? {
                return Ok(None);
            }
            self.vectors.remove(id);
            self.fields.remove(id);
            tracing::debug!(id, "deleted item");
            Ok(Some(id.to_string()))
        })
    }

    /// The `k` items nearest to `embedding` (raw little-endian bytes), most
    /// similar first.
    pub fn search(&self, embedding: &[u8], k: usize) -> RepositoryResult<Vec<SearchHit>> {
        self.observe(Operation::Search, || {
            self.validate_k(k)?;
            let query = Embedding::from_le_bytes(embedding)?;
            let neighbors = self.vectors.query_knn(query.as_slice(), k)?;

            let mut hits = Vec::with_capacity(neighbors.len());
            for neighbor in neighbors {
                match self.store.get(&neighbor.id)? {
                    Some(record) => hits.push(SearchHit {
                        item: Item::from(&record),
                        score: neighbor.score,
                    }),
                    None => tracing::warn!(
                        id = %neighbor.id,
                        "search hit missing from record store; dropped"
                    ),
                }
            }
            Ok(hits)
        })
    }

    /// [`ItemRepository::search`] with the configured default `k`.
    pub fn search_default(&self, embedding: &[u8]) -> RepositoryResult<Vec<SearchHit>> {
        self.search(embedding, self.config.default_k)
    }

    /// Items whose `field` matches `query`, oldest first, at most `limit`.
    pub fn find(
        &self,
        field: TextField,
        query: &str,
        mode: MatchMode,
        limit: usize,
    ) -> RepositoryResult<Vec<Item>> {
        self.observe(Operation::Find, || {
            let mut items = Vec::new();
            for id in self.fields.find(field, query, mode, limit) {
                match self.store.get(&id)? {
                    Some(record) => items.push(Item::from(&record)),
                    None => {
                        tracing::warn!(id = %id, "field match missing from record store; dropped")
                    }
                }
            }
            Ok(items)
        })
    }

    pub fn stats(&self) -> RepositoryStats {
        RepositoryStats {
            items: self.fields.len(),
            vectors: self.vectors.len(),
            dimension: self.vectors.dimension(),
            ann_active: self.vectors.ann_active(),
        }
    }

    fn validate_input(&self, input: ItemInput) -> Result<Draft, ValidationError> {
        validate_text(TextField::Title, &input.title)?;
        validate_text(TextField::Author, &input.author)?;
        let embedding = Embedding::from_le_bytes(&input.embedding)?;
        let image = input
            .image
            .map(|image| self.validate_image(image))
            .transpose()?;
        Ok(Draft {
            title: input.title,
            author: input.author,
            description: input.description,
            embedding,
            image,
        })
    }

    /// Check size and media type; the stored content type is the lowercase
    /// media type without parameters.
    fn validate_image(&self, image: Image) -> Result<StoredImage, ValidationError> {
        if image.bytes.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        if image.bytes.len() > self.config.max_image_bytes {
            return Err(ValidationError::ImageTooLarge {
                size: image.bytes.len(),
                max: self.config.max_image_bytes,
            });
        }
        let essence = image
            .content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.is_empty() {
            return Err(ValidationError::MissingField("content_type"));
        }
        if !self.config.allowed_content_types.contains(&essence) {
            return Err(ValidationError::UnsupportedContentType(image.content_type));
        }
        Ok(StoredImage {
            bytes: image.bytes,
            content_type: essence,
        })
    }

    fn validate_k(&self, k: usize) -> Result<(), ValidationError> {
        if k == 0 || k > self.config.max_k {
            return Err(ValidationError::InvalidK {
                k,
                max: self.config.max_k,
            });
        }
        Ok(())
    }
}

/// Title and author must not be blank; the description may be empty.
fn validate_text(field: TextField, value: &str) -> Result<(), ValidationError> {
    match field {
        TextField::Title | TextField::Author if value.trim().is_empty() => {
            Err(ValidationError::MissingField(field.as_str()))
        }
        _ => Ok(()),
    }
}

fn text_fields(record: &StoredRecord) -> TextFields {
    TextFields {
        title: record.title.clone(),
        author: record.author.clone(),
        description: record.description.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> ItemRepository {
        ItemRepository::open(RepositoryConfig::default().with_lock_stripes(4)).unwrap()
    }

    fn image(content_type: &str) -> Image {
        Image::new(vec![0x89, b'P', b'N', b'G'], content_type)
    }

    #[test]
    fn content_type_is_normalized() {
        let repo = repo();
        let stored = repo.validate_image(image("Image/PNG; charset=binary")).unwrap();
        assert_eq!(stored.content_type, "image/png");
    }

    #[test]
    fn image_checks() {
        let repo = ItemRepository::open(RepositoryConfig::default().with_max_image_bytes(3))
            .unwrap();
        assert_eq!(
            repo.validate_image(image("image/png")).unwrap_err(),
            ValidationError::ImageTooLarge { size: 4, max: 3 }
        );
        assert_eq!(
            repo.validate_image(Image::new(Vec::new(), "image/png"))
                .unwrap_err(),
            ValidationError::EmptyImage
        );
        assert_eq!(
            repo.validate_image(Image::new(vec![1], "application/pdf"))
                .unwrap_err(),
            ValidationError::UnsupportedContentType("application/pdf".into())
        );
        assert_eq!(
            repo.validate_image(Image::new(vec![1], " ")).unwrap_err(),
            ValidationError::MissingField("content_type")
        );
    }

    #[test]
    fn k_bounds() {
        let repo = repo();
        assert!(repo.validate_k(1).is_ok());
        assert!(repo.validate_k(100).is_ok());
        assert_eq!(
            repo.validate_k(0).unwrap_err(),
            ValidationError::InvalidK { k: 0, max: 100 }
        );
        assert!(repo.validate_k(101).is_err());
    }

    #[test]
    fn blank_title_and_author_are_rejected() {
        assert_eq!(
            validate_text(TextField::Title, "  ").unwrap_err(),
            ValidationError::MissingField("title")
        );
        assert!(validate_text(TextField::Author, "").is_err());
        assert!(validate_text(TextField::Description, "").is_ok());
    }

    #[test]
    fn stripes_are_stable_and_in_range() {
        let repo = repo();
        assert_eq!(repo.stripe("same"), repo.stripe("same"));
        for i in 0..100 {
            assert!(repo.stripe(&format!("id-{i}")) < 4);
        }
    }
}
