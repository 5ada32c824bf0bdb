//! Text-field index kept apart from the vector index, so title, author and
//! description can be read and replaced without touching embedding data.

use crate::record::TextField;
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The indexed text fields of one record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextFields {
    pub title: String,
    pub author: String,
    pub description: String,
}

impl TextFields {
    pub fn get(&self, field: TextField) -> &str {
        match field {
            TextField::Title => &self.title,
            TextField::Author => &self.author,
            TextField::Description => &self.description,
        }
    }

    fn set(&mut self, field: TextField, value: String) {
        match field {
            TextField::Title => self.title = value,
            TextField::Author => self.author = value,
            TextField::Description => self.description = value,
        }
    }
}

/// How [`FieldIndex::find`] compares a field against the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Whole value equals the query (case-insensitive).
    Exact,
    /// Value contains the query (case-insensitive).
    #[default]
    Substring,
}

struct Entry {
    fields: TextFields,
    /// Lowercased copies used for matching.
    folded: [String; 3],
}

impl Entry {
    fn new(fields: TextFields) -> Self {
        let folded = [
            fields.title.to_lowercase(),
            fields.author.to_lowercase(),
            fields.description.to_lowercase(),
        ];
        Self { fields, folded }
    }

    fn folded(&self, field: TextField) -> &str {
        match field {
            TextField::Title => &self.folded[0],
            TextField::Author => &self.folded[1],
            TextField::Description => &self.folded[2],
        }
    }

    fn set(&mut self, field: TextField, value: String) {
        let slot = match field {
            TextField::Title => 0,
            TextField::Author => 1,
            TextField::Description => 2,
        };
        self.folded[slot] = value.to_lowercase();
        self.fields.set(field, value);
    }
}

/// In-memory index of per-record text fields.
#[derive(Default)]
pub struct FieldIndex {
    entries: RwLock<hashbrown::HashMap<String, Entry>>,
}

impl FieldIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, hashbrown::HashMap<String, Entry>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, hashbrown::HashMap<String, Entry>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace all text fields of a record.
    pub fn upsert(&self, id: &str, fields: TextFields) {
        self.write().insert(id.to_string(), Entry::new(fields));
    }

    /// Replace one field of a known record. Returns `false` for unknown ids.
    pub fn set(&self, id: &str, field: TextField, value: &str) -> bool {
        match self.write().get_mut(id) {
            Some(entry) => {
                entry.set(field, value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str, field: TextField) -> Option<String> {
        self.read()
            .get(id)
            .map(|entry| entry.fields.get(field).to_string())
    }

    /// Remove a record. Absent ids are a no-op.
    pub fn remove(&self, id: &str) -> bool {
        self.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Identifiers whose `field` matches `query`, in ascending id order,
    /// truncated to `limit`. Identifiers sort by creation time, so this is
    /// oldest first.
    pub fn find(
        &self,
        field: TextField,
        query: &str,
        mode: MatchMode,
        limit: usize,
    ) -> Vec<String> {
        let needle = query.to_lowercase();
        let guard = self.read();
        let mut ids: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| {
                let value = entry.folded(field);
                match mode {
                    MatchMode::Exact => value == needle,
                    MatchMode::Substring => value.contains(&needle),
                }
            })
            .map(|(id, _)| id.clone())
            .collect();
        drop(guard);

        ids.sort_unstable();
        ids.truncate(limit);
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(title: &str, author: &str) -> TextFields {
        TextFields {
            title: title.into(),
            author: author.into(),
            description: String::new(),
        }
    }

    #[test]
    fn set_only_touches_known_ids() {
        let index = FieldIndex::new();
        assert!(!index.set("ghost", TextField::Title, "x"));
        assert!(!index.contains("ghost"));

        index.upsert("a", fields("Starry Night", "Van Gogh"));
        assert!(index.set("a", TextField::Title, "The Starry Night"));
        assert_eq!(
            index.get("a", TextField::Title).as_deref(),
            Some("The Starry Night")
        );
        assert_eq!(index.get("a", TextField::Author).as_deref(), Some("Van Gogh"));
    }

    #[test]
    fn find_exact_and_substring_are_case_insensitive() {
        let index = FieldIndex::new();
        index.upsert("01", fields("Starry Night", "Vincent van Gogh"));
        index.upsert("02", fields("Sunflowers", "Vincent van Gogh"));
        index.upsert("03", fields("Water Lilies", "Claude Monet"));

        assert_eq!(
            index.find(TextField::Author, "van gogh", MatchMode::Substring, 10),
            vec!["01".to_string(), "02".to_string()]
        );
        assert_eq!(
            index.find(TextField::Title, "SUNFLOWERS", MatchMode::Exact, 10),
            vec!["02".to_string()]
        );
        assert!(index
            .find(TextField::Title, "Sun", MatchMode::Exact, 10)
            .is_empty());
        assert_eq!(
            index
                .find(TextField::Author, "vincent", MatchMode::Substring, 1)
                .len(),
            1
        );
    }

    #[test]
    fn find_sees_updated_values() {
        let index = FieldIndex::new();
        index.upsert("01", fields("Untitled", "Unknown"));
        index.set("01", TextField::Title, "Composition VIII");
        assert_eq!(
            index.find(TextField::Title, "composition", MatchMode::Substring, 5),
            vec!["01".to_string()]
        );
        assert!(index
            .find(TextField::Title, "untitled", MatchMode::Substring, 5)
            .is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let index = FieldIndex::new();
        index.upsert("a", fields("t", "a"));
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert!(index.is_empty());
    }
}
