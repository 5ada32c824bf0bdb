//! Redb (Rust embedded database) backend implementation for record storage.
//!
//! Redb is a pure Rust embedded key-value store that provides ACID transactions
//! without requiring external dependencies.
//!
//! Records are stored one key per field: the key is the `(id, field)` tuple, so
//! a single field can be read or rewritten without touching its siblings while
//! a whole record is still one contiguous key range.
//!
//! # Configuration Example
//! ```yaml
//! storage:
//!   backend: "redb"
//!   path: "/data/artdeco.redb"
//! ```

use crate::backend::{FieldMap, RecordBackend};
use crate::record::fields;
use crate::IndexError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Record fields keyed by `(id, field)`.
const RECORDS_TABLE: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("items");

/// Store-level metadata such as declared index schemas.
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// Redb backend implementation for persistent record storage.
///
/// # Thread Safety
/// The `Arc<Database>` wrapper allows safe sharing across threads.
/// Redb handles its own internal locking and MVCC, so a reader never observes
/// a half-written record.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    ///
    /// # Example
    /// ```no_run
    /// use index::RedbBackend;
    ///
    /// let backend = RedbBackend::open("/tmp/artdeco.redb").unwrap();
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let db = Database::create(path).map_err(IndexError::backend)?;

        let write_txn = db.begin_write().map_err(IndexError::backend)?;
        {
            // Accessing the tables creates them if they don't exist
            write_txn
                .open_table(RECORDS_TABLE)
                .map_err(IndexError::backend)?;
            write_txn.open_table(META_TABLE).map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

/// Collect every field stored under `id`.
fn read_fields<T>(table: &T, id: &str) -> Result<FieldMap, IndexError>
where
    T: ReadableTable<(&'static str, &'static str), &'static [u8]>,
{
    let mut record = FieldMap::new();
    for entry in table.range((id, "")..).map_err(IndexError::backend)? {
        let (key, value) = entry.map_err(IndexError::backend)?;
        let (owner, field) = key.value();
        if owner != id {
            break;
        }
        record.insert(field.to_string(), value.value().to_vec());
    }
    Ok(record)
}

fn field_names<T>(table: &T, id: &str) -> Result<Vec<String>, IndexError>
where
    T: ReadableTable<(&'static str, &'static str), &'static [u8]>,
{
    Ok(read_fields(table, id)?.into_keys().collect())
}

impl RecordBackend for RedbBackend {
    fn put_record(&self, id: &str, record: &FieldMap) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(IndexError::backend)?;

            for field in field_names(&table, id)? {
                if !record.contains_key(&field) {
                    table
                        .remove((id, field.as_str()))
                        .map_err(IndexError::backend)?;
                }
            }
            table
                .insert((id, fields::ID), id.as_bytes())
                .map_err(IndexError::backend)?;
            for (field, value) in record {
                if field == fields::ID {
                    continue;
                }
                table
                    .insert((id, field.as_str()), value.as_slice())
                    .map_err(IndexError::backend)?;
            }
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn get_record(&self, id: &str) -> Result<Option<FieldMap>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .map_err(IndexError::backend)?;

        let record = read_fields(&table, id)?;
        if record.contains_key(fields::ID) {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    fn get_field(&self, id: &str, field: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .map_err(IndexError::backend)?;

        match table.get((id, field)).map_err(IndexError::backend)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn set_fields(&self, id: &str, values: &[(&str, &[u8])]) -> Result<bool, IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(IndexError::backend)?;

            let existed = table
                .get((id, fields::ID))
                .map_err(IndexError::backend)?
                .is_some();
            if existed {
                for (field, value) in values {
                    table
                        .insert((id, *field), *value)
                        .map_err(IndexError::backend)?;
                }
            }
            existed
        };

        if existed {
            write_txn.commit().map_err(IndexError::backend)?;
        } else {
            write_txn.abort().map_err(IndexError::backend)?;
        }
        Ok(existed)
    }

    fn delete_record(&self, id: &str) -> Result<bool, IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        let existed = {
            let mut table = write_txn
                .open_table(RECORDS_TABLE)
                .map_err(IndexError::backend)?;

            let names = field_names(&table, id)?;
            for field in &names {
                table
                    .remove((id, field.as_str()))
                    .map_err(IndexError::backend)?;
            }
            names.iter().any(|field| field == fields::ID)
        };
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(existed)
    }

    fn exists(&self, id: &str) -> Result<bool, IndexError> {
        Ok(self.get_field(id, fields::ID)?.is_some())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &FieldMap) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(RECORDS_TABLE)
            .map_err(IndexError::backend)?;

        // Keys are ordered by id first, so each record is a contiguous run.
        let mut current: Option<(String, FieldMap)> = None;
        for item in table.iter().map_err(IndexError::backend)? {
            let (key, value) = item.map_err(IndexError::backend)?;
            let (owner, field) = key.value();

            let same_owner = matches!(&current, Some((id, _)) if id == owner);
            if !same_owner {
                if let Some((id, record)) = current.take() {
                    if record.contains_key(fields::ID) {
                        visitor(&id, &record)?;
                    }
                }
                current = Some((owner.to_string(), FieldMap::new()));
            }
            if let Some((_, record)) = current.as_mut() {
                record.insert(field.to_string(), value.value().to_vec());
            }
        }
        if let Some((id, record)) = current {
            if record.contains_key(fields::ID) {
                visitor(&id, &record)?;
            }
        }

        Ok(())
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let table = read_txn
            .open_table(META_TABLE)
            .map_err(IndexError::backend)?;
        match table.get(key).map_err(IndexError::backend)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut table = write_txn
                .open_table(META_TABLE)
                .map_err(IndexError::backend)?;
            table.insert(key, value).map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        // Redb commits are synchronous by default, so flush is a no-op
        Ok(())
    }
}
