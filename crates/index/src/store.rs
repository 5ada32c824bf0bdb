use crate::backend::{BackendConfig, RecordBackend};
use crate::record::{
    decode_text, decode_vector, encode_vector, fields, StoredImage, StoredRecord, TextField,
};
use crate::schema::{IndexSchema, SchemaStatus};
use crate::IndexError;

/// Key-value persistence of item records keyed by identifier.
///
/// Field values are individually addressable, so single-field updates never
/// rewrite the whole record, but a full [`RecordStore::get`] always reads one
/// consistent version.
pub struct RecordStore {
    /// The backend used for storage, abstracted behind a trait.
    backend: Box<dyn RecordBackend>,
}

impl RecordStore {
    /// Wrap an already built backend (e.g., in-memory for tests).
    pub fn new(backend: Box<dyn RecordBackend>) -> Self {
        Self { backend }
    }

    /// Build the backend from its configuration.
    pub fn open(cfg: &BackendConfig) -> Result<Self, IndexError> {
        Ok(Self::new(cfg.build()?))
    }

    /// Declare the index schema. Persists it when absent, accepts an equal
    /// one and rejects an incompatible one.
    pub fn declare_schema(&self, schema: &IndexSchema) -> Result<SchemaStatus, IndexError> {
        let key = schema.meta_key();
        match self.backend.get_meta(&key)? {
            None => {
                let encoded =
                    serde_json::to_vec(schema).map_err(|e| IndexError::Encode(e.to_string()))?;
                self.backend.put_meta(&key, &encoded)?;
                tracing::info!(
                    index = %schema.name,
                    dimension = schema.dimension,
                    "declared index schema"
                );
                Ok(SchemaStatus::Created)
            }
            Some(bytes) => {
                let stored: IndexSchema = serde_json::from_slice(&bytes)?;
                match stored.incompatibility(schema) {
                    None => Ok(SchemaStatus::Existing),
                    Some(reason) => Err(IndexError::SchemaMismatch {
                        name: schema.name.clone(),
                        reason,
                    }),
                }
            }
        }
    }

    /// Insert or fully overwrite a record.
    pub fn put(&self, record: &StoredRecord) -> Result<(), IndexError> {
        self.backend.put_record(&record.id, &record.to_fields())
    }

    pub fn get(&self, id: &str) -> Result<Option<StoredRecord>, IndexError> {
        match self.backend.get_record(id)? {
            Some(map) => Ok(Some(StoredRecord::from_fields(id, &map)?)),
            None => Ok(None),
        }
    }

    /// Raw bytes of one field; `None` when the record or the field is absent.
    pub fn get_field(&self, id: &str, field: &str) -> Result<Option<Vec<u8>>, IndexError> {
        self.backend.get_field(id, field)
    }

    /// Overwrite one field of an existing record and return the stored value.
    ///
    /// Returns `None` for an unknown id; never creates a partial record.
    /// `image` and `content_type` are one unit and go through
    /// [`RecordStore::set_image`].
    pub fn set_field(
        &self,
        id: &str,
        field: &str,
        value: &[u8],
    ) -> Result<Option<Vec<u8>>, IndexError> {
        if matches!(field, fields::ID | fields::IMAGE | fields::CONTENT_TYPE) {
            return Err(IndexError::Encode(format!(
                "field {field} cannot be set on its own"
            )));
        }
        if self.backend.set_fields(id, &[(field, value)])? {
            Ok(Some(value.to_vec()))
        } else {
            Ok(None)
        }
    }

    pub fn get_text(&self, id: &str, field: TextField) -> Result<Option<String>, IndexError> {
        self.get_field(id, field.as_str())?
            .map(|bytes| decode_text(field.as_str(), &bytes))
            .transpose()
    }

    pub fn set_text(
        &self,
        id: &str,
        field: TextField,
        value: &str,
    ) -> Result<Option<String>, IndexError> {
        Ok(self
            .set_field(id, field.as_str(), value.as_bytes())?
            .map(|_| value.to_string()))
    }

    pub fn get_embedding(&self, id: &str) -> Result<Option<Vec<f32>>, IndexError> {
        self.get_field(id, fields::EMBEDDING)?
            .map(|bytes| decode_vector(&bytes))
            .transpose()
    }

    /// Replace the stored embedding bytes. Returns whether the record exists.
    pub fn set_embedding(&self, id: &str, embedding: &[f32]) -> Result<bool, IndexError> {
        Ok(self
            .set_field(id, fields::EMBEDDING, &encode_vector(embedding))?
            .is_some())
    }

    /// Read the image payload and its content type; `None` when either is missing.
    pub fn get_image(&self, id: &str) -> Result<Option<StoredImage>, IndexError> {
        let Some(bytes) = self.get_field(id, fields::IMAGE)? else {
            return Ok(None);
        };
        let Some(content_type) = self.get_field(id, fields::CONTENT_TYPE)? else {
            return Ok(None);
        };
        Ok(Some(StoredImage {
            bytes,
            content_type: decode_text(fields::CONTENT_TYPE, &content_type)?,
        }))
    }

    /// Write image bytes and content type together. Returns whether the record exists.
    pub fn set_image(&self, id: &str, image: &StoredImage) -> Result<bool, IndexError> {
        self.backend.set_fields(
            id,
            &[
                (fields::IMAGE, image.bytes.as_slice()),
                (fields::CONTENT_TYPE, image.content_type.as_bytes()),
            ],
        )
    }

    /// Remove a record. Returns whether it existed.
    pub fn delete(&self, id: &str) -> Result<bool, IndexError> {
        self.backend.delete_record(id)
    }

    pub fn exists(&self, id: &str) -> Result<bool, IndexError> {
        self.backend.exists(id)
    }

    /// Visit every stored record.
    pub fn scan(
        &self,
        visitor: &mut dyn FnMut(StoredRecord) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.backend
            .scan(&mut |id, map| visitor(StoredRecord::from_fields(id, map)?))
    }

    /// Flush backend buffers if supported.
    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;

    fn store() -> RecordStore {
        RecordStore::new(Box::new(InMemoryBackend::new()))
    }

    fn record(id: &str) -> StoredRecord {
        StoredRecord {
            id: id.to_string(),
            title: "The Kiss".into(),
            author: "Gustav Klimt".into(),
            description: "Oil and gold leaf on canvas".into(),
            embedding: vec![0.0, 1.0],
            image: None,
        }
    }

    #[test]
    fn put_get_roundtrip() {
        let store = store();
        store.put(&record("a")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(record("a")));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn set_text_on_unknown_id_is_noop() {
        let store = store();
        assert_eq!(store.set_text("ghost", TextField::Title, "x").unwrap(), None);
        assert!(!store.exists("ghost").unwrap());
        assert_eq!(store.get("ghost").unwrap(), None);
    }

    #[test]
    fn set_text_leaves_siblings_untouched() {
        let store = store();
        store.put(&record("a")).unwrap();
        assert_eq!(
            store.set_text("a", TextField::Title, "Adele").unwrap(),
            Some("Adele".to_string())
        );
        let stored = store.get("a").unwrap().unwrap();
        assert_eq!(stored.title, "Adele");
        assert_eq!(stored.author, "Gustav Klimt");
        assert_eq!(stored.embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn image_is_written_as_a_unit() {
        let store = store();
        store.put(&record("a")).unwrap();
        assert_eq!(store.get_image("a").unwrap(), None);

        let image = StoredImage {
            bytes: vec![1, 2, 3],
            content_type: "image/png".into(),
        };
        assert!(store.set_image("a", &image).unwrap());
        assert_eq!(store.get_image("a").unwrap(), Some(image.clone()));
        assert!(!store.set_image("ghost", &image).unwrap());

        assert!(matches!(
            store.set_field("a", fields::IMAGE, &[9]),
            Err(IndexError::Encode(_))
        ));
    }

    #[test]
    fn embedding_field_roundtrip() {
        let store = store();
        store.put(&record("a")).unwrap();
        assert!(store.set_embedding("a", &[0.6, 0.8]).unwrap());
        assert_eq!(store.get_embedding("a").unwrap(), Some(vec![0.6, 0.8]));
        assert!(!store.set_embedding("ghost", &[1.0, 0.0]).unwrap());
    }

    #[test]
    fn delete_reports_presence() {
        let store = store();
        store.put(&record("a")).unwrap();
        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get_text("a", TextField::Author).unwrap(), None);
    }

    #[test]
    fn schema_declaration_is_idempotent_and_strict() {
        let store = store();
        let schema = IndexSchema::items();
        assert_eq!(store.declare_schema(&schema).unwrap(), SchemaStatus::Created);
        assert_eq!(store.declare_schema(&schema).unwrap(), SchemaStatus::Existing);

        let result = store.declare_schema(&schema.with_dimension(256));
        assert!(matches!(result, Err(IndexError::SchemaMismatch { .. })));
    }
}
