use index::{StoredImage, StoredRecord};
use serde::{Deserialize, Serialize};

/// Structured view of an artwork item.
///
/// Never carries the embedding or image bytes; those have their own accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Free text or a source URL.
    pub description: String,
}

impl From<&StoredRecord> for Item {
    fn from(record: &StoredRecord) -> Self {
        Self {
            id: record.id.clone(),
            title: record.title.clone(),
            author: record.author.clone(),
            description: record.description.clone(),
        }
    }
}

/// Image payload and its content-type label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Image {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }
}

impl From<StoredImage> for Image {
    fn from(image: StoredImage) -> Self {
        Self {
            bytes: image.bytes,
            content_type: image.content_type,
        }
    }
}

impl From<Image> for StoredImage {
    fn from(image: Image) -> Self {
        Self {
            bytes: image.bytes,
            content_type: image.content_type,
        }
    }
}

/// Everything needed to create or fully replace an item.
///
/// `embedding` holds raw little-endian `f32` bytes and is validated by the
/// repository.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemInput {
    pub title: String,
    pub author: String,
    pub description: String,
    pub embedding: Vec<u8>,
    pub image: Option<Image>,
}

impl ItemInput {
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        description: impl Into<String>,
        embedding: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            description: description.into(),
            embedding: embedding.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Image) -> Self {
        self.image = Some(image);
        self
    }
}

/// One search result; lower `score` is more similar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub item: Item,
    pub score: f32,
}

/// Point-in-time counters of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub items: usize,
    pub vectors: usize,
    pub dimension: usize,
    pub ann_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_hit_serializes_flat() {
        let hit = SearchHit {
            item: Item {
                id: "0190".into(),
                title: "Sunflowers".into(),
                author: "Vincent van Gogh".into(),
                description: "https://example.org/sunflowers".into(),
            },
            score: 0.25,
        };
        let value = serde_json::to_value(&hit).unwrap();
        assert_eq!(value["id"], "0190");
        assert_eq!(value["title"], "Sunflowers");
        assert_eq!(value["score"], 0.25);
        assert!(value.get("item").is_none());
    }
}
