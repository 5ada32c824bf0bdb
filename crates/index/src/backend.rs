use crate::record::fields;
use crate::IndexError;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// A record in its persisted shape: field name to raw bytes.
pub type FieldMap = BTreeMap<String, Vec<u8>>;

/// Trait for a field-addressable record storage backend.
/// This allows for different storage implementations (e.g., in-memory, Redb).
///
/// A record exists iff its [`fields::ID`] field is present. Every method that
/// touches more than one field does so atomically.
pub trait RecordBackend: Send + Sync {
    /// Replace every field of a record. Fields of the previous version that
    /// are absent from `record` are removed.
    fn put_record(&self, id: &str, record: &FieldMap) -> Result<(), IndexError>;
    /// Retrieve all fields of a record.
    fn get_record(&self, id: &str) -> Result<Option<FieldMap>, IndexError>;
    /// Retrieve a single field of a record.
    fn get_field(&self, id: &str, field: &str) -> Result<Option<Vec<u8>>, IndexError>;
    /// Write the given fields of an existing record. Returns `false` without
    /// writing anything if the record does not exist.
    fn set_fields(&self, id: &str, values: &[(&str, &[u8])]) -> Result<bool, IndexError>;
    /// Delete all fields of a record. Returns whether the record existed.
    fn delete_record(&self, id: &str) -> Result<bool, IndexError>;
    /// Check whether a record exists.
    fn exists(&self, id: &str) -> Result<bool, IndexError>;
    /// Scan all records in the backend, calling the visitor for each one.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &FieldMap) -> Result<(), IndexError>,
    ) -> Result<(), IndexError>;
    /// Read a metadata value (e.g. a declared index schema).
    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError>;
    /// Write a metadata value.
    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use index::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (pure Rust, persistent)
/// let config = BackendConfig::redb("/data/artdeco.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendConfig {
    /// Use Redb for storage. The `path` is the file path for the database.
    ///
    /// Requires the `backend-redb` feature to be enabled at compile time (enabled by default).
    Redb { path: String },
    /// Use an in-memory HashMap for storage. This is useful for testing.
    #[default]
    InMemory,
}

impl BackendConfig {
    /// Create an in-memory backend configuration.
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    /// Create a Redb backend configuration.
    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    ///
    /// Each backend type is only available if its corresponding feature flag
    /// is enabled at compile time.
    pub fn build(&self) -> Result<Box<dyn RecordBackend>, IndexError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(IndexError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend using a `RwLock` around a `HashMap`.
pub struct InMemoryBackend {
    records: RwLock<hashbrown::HashMap<String, FieldMap>>,
    meta: RwLock<hashbrown::HashMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(hashbrown::HashMap::new()),
            meta: RwLock::new(hashbrown::HashMap::new()),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: T) -> IndexError {
    IndexError::backend("poisoned lock")
}

impl RecordBackend for InMemoryBackend {
    fn put_record(&self, id: &str, record: &FieldMap) -> Result<(), IndexError> {
        let mut record = record.clone();
        record.insert(fields::ID.to_string(), id.as_bytes().to_vec());
        // The lock is held for the duration of the insert.
        self.records
            .write()
            .map_err(poisoned)?
            .insert(id.to_string(), record);
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<FieldMap>, IndexError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    fn get_field(&self, id: &str, field: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let guard = self.records.read().map_err(poisoned)?;
        Ok(guard.get(id).and_then(|record| record.get(field)).cloned())
    }

    fn set_fields(&self, id: &str, values: &[(&str, &[u8])]) -> Result<bool, IndexError> {
        let mut guard = self.records.write().map_err(poisoned)?;
        match guard.get_mut(id) {
            Some(record) => {
                for (field, value) in values {
                    record.insert((*field).to_string(), value.to_vec());
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_record(&self, id: &str) -> Result<bool, IndexError> {
        Ok(self
            .records
            .write()
            .map_err(poisoned)?
            .remove(id)
            .is_some())
    }

    fn exists(&self, id: &str) -> Result<bool, IndexError> {
        Ok(self.records.read().map_err(poisoned)?.contains_key(id))
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &FieldMap) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        // A read lock is held for the duration of the scan.
        let guard = self.records.read().map_err(poisoned)?;
        for (id, record) in guard.iter() {
            visitor(id, record)?;
        }
        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        Ok(self.meta.read().map_err(poisoned)?.get(key).cloned())
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.meta
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// The Redb backend implementation.
///
/// Redb is a pure Rust ACID-compliant embedded database that serves as the
/// persistent storage backend.
#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("title".into(), title.as_bytes().to_vec());
        map.insert("embedding".into(), vec![0, 0, 128, 63]);
        map
    }

    #[test]
    fn in_memory_put_overwrites_every_field() {
        let backend = InMemoryBackend::new();
        backend.put_record("a", &record("first")).unwrap();

        let mut second = FieldMap::new();
        second.insert("title".into(), b"second".to_vec());
        backend.put_record("a", &second).unwrap();

        let stored = backend.get_record("a").unwrap().unwrap();
        assert_eq!(stored.get("title").unwrap(), b"second");
        assert!(stored.get("embedding").is_none());
        assert_eq!(stored.get(fields::ID).unwrap(), b"a");
    }

    #[test]
    fn in_memory_set_fields_requires_existing_record() {
        let backend = InMemoryBackend::new();
        assert!(!backend.set_fields("ghost", &[("title", b"x")]).unwrap());
        assert!(!backend.exists("ghost").unwrap());

        backend.put_record("a", &record("first")).unwrap();
        assert!(backend
            .set_fields("a", &[("image", b"\x89PNG"), ("content_type", b"image/png")])
            .unwrap());
        assert_eq!(
            backend.get_field("a", "content_type").unwrap(),
            Some(b"image/png".to_vec())
        );
    }

    #[test]
    fn in_memory_delete_reports_presence() {
        let backend = InMemoryBackend::new();
        backend.put_record("a", &record("first")).unwrap();
        assert!(backend.delete_record("a").unwrap());
        assert!(!backend.delete_record("a").unwrap());
        assert_eq!(backend.get_field("a", "title").unwrap(), None);
    }

    #[test]
    fn in_memory_meta_roundtrip() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.get_meta("schema").unwrap(), None);
        backend.put_meta("schema", b"{}").unwrap();
        assert_eq!(backend.get_meta("schema").unwrap(), Some(b"{}".to_vec()));
    }

    #[test]
    fn build_in_memory_from_config() {
        let backend = BackendConfig::in_memory().build().unwrap();
        backend.put_record("a", &record("first")).unwrap();
        let mut seen = Vec::new();
        backend
            .scan(&mut |id, _| {
                seen.push(id.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(seen, vec!["a".to_string()]);
    }
}
