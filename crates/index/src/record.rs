use crate::backend::FieldMap;
use crate::IndexError;
use serde::{Deserialize, Serialize};

/// Field names of the persisted record layout.
///
/// Every record is a flat mapping of these names to raw bytes. Text fields
/// are UTF-8, `embedding` is little-endian `f32` bytes and `image` /
/// `content_type` are written as one unit.
pub mod fields {
    pub const ID: &str = "id";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const DESCRIPTION: &str = "description";
    pub const EMBEDDING: &str = "embedding";
    pub const IMAGE: &str = "image";
    pub const CONTENT_TYPE: &str = "content_type";
}

/// The independently updatable text fields of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Title,
    Author,
    Description,
}

impl TextField {
    pub const ALL: [TextField; 3] = [TextField::Title, TextField::Author, TextField::Description];

    /// Name of the field in the persisted layout.
    pub fn as_str(self) -> &'static str {
        match self {
            TextField::Title => fields::TITLE,
            TextField::Author => fields::AUTHOR,
            TextField::Description => fields::DESCRIPTION,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            fields::TITLE => Some(TextField::Title),
            fields::AUTHOR => Some(TextField::Author),
            fields::DESCRIPTION => Some(TextField::Description),
            _ => None,
        }
    }
}

impl std::fmt::Display for TextField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary payload together with its content-type label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// A full record as held by the Record Store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub embedding: Vec<f32>,
    pub image: Option<StoredImage>,
}

impl StoredRecord {
    /// Flatten the record into its persisted field layout.
    pub fn to_fields(&self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(fields::ID.to_string(), self.id.as_bytes().to_vec());
        map.insert(fields::TITLE.to_string(), self.title.as_bytes().to_vec());
        map.insert(fields::AUTHOR.to_string(), self.author.as_bytes().to_vec());
        map.insert(
            fields::DESCRIPTION.to_string(),
            self.description.as_bytes().to_vec(),
        );
        map.insert(fields::EMBEDDING.to_string(), encode_vector(&self.embedding));
        if let Some(image) = &self.image {
            map.insert(fields::IMAGE.to_string(), image.bytes.clone());
            map.insert(
                fields::CONTENT_TYPE.to_string(),
                image.content_type.as_bytes().to_vec(),
            );
        }
        map
    }

    /// Rebuild a record from its persisted field layout.
    ///
    /// Missing text fields decode as empty strings; an image is only present
    /// when both `image` and `content_type` are.
    pub fn from_fields(id: &str, map: &FieldMap) -> Result<Self, IndexError> {
        let text = |name: &str| -> Result<String, IndexError> {
            map.get(name)
                .map(|bytes| decode_text(name, bytes))
                .transpose()
                .map(Option::unwrap_or_default)
        };

        let embedding = match map.get(fields::EMBEDDING) {
            Some(bytes) => decode_vector(bytes)?,
            None => Vec::new(),
        };

        let image = match (map.get(fields::IMAGE), map.get(fields::CONTENT_TYPE)) {
            (Some(bytes), Some(content_type)) => Some(StoredImage {
                bytes: bytes.clone(),
                content_type: decode_text(fields::CONTENT_TYPE, content_type)?,
            }),
            _ => None,
        };

        Ok(Self {
            id: id.to_string(),
            title: text(fields::TITLE)?,
            author: text(fields::AUTHOR)?,
            description: text(fields::DESCRIPTION)?,
            embedding,
            image,
        })
    }
}

pub(crate) fn decode_text(field: &str, bytes: &[u8]) -> Result<String, IndexError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| IndexError::Decode(format!("field {field} is not UTF-8: {e}")))
}

/// Encode a vector as raw little-endian `f32` bytes.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode raw little-endian `f32` bytes.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>, IndexError> {
    if bytes.len() % 4 != 0 {
        return Err(IndexError::Decode(format!(
            "vector byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
