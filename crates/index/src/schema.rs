use crate::record::{fields, TextField};
use crate::EMBEDDING_DIM;
use serde::{Deserialize, Serialize};

/// Distance metric of a vector field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`; lower is more similar.
    Cosine,
}

/// Declared shape of the searchable index over the record store.
///
/// Persisted once in the backend's metadata; reopening with a different
/// declaration is a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub text_fields: Vec<String>,
    pub vector_field: String,
    pub dimension: usize,
    pub metric: DistanceMetric,
}

impl IndexSchema {
    /// The artwork item index: three text fields plus one 512-dimension cosine vector.
    pub fn items() -> Self {
        Self {
            name: "idx:items".to_string(),
            text_fields: TextField::ALL
                .iter()
                .map(|field| field.as_str().to_string())
                .collect(),
            vector_field: fields::EMBEDDING.to_string(),
            dimension: EMBEDDING_DIM,
            metric: DistanceMetric::Cosine,
        }
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub(crate) fn meta_key(&self) -> String {
        format!("schema:{}", self.name)
    }

    /// Describe the first difference between a stored and a declared schema.
    pub(crate) fn incompatibility(&self, declared: &IndexSchema) -> Option<String> {
        if self.text_fields != declared.text_fields {
            return Some(format!(
                "text fields {:?} != {:?}",
                self.text_fields, declared.text_fields
            ));
        }
        if self.vector_field != declared.vector_field {
            return Some(format!(
                "vector field {} != {}",
                self.vector_field, declared.vector_field
            ));
        }
        if self.dimension != declared.dimension {
            return Some(format!(
                "dimension {} != {}",
                self.dimension, declared.dimension
            ));
        }
        if self.metric != declared.metric {
            return Some(format!("metric {:?} != {:?}", self.metric, declared.metric));
        }
        None
    }
}

/// Outcome of declaring a schema at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    /// No schema was stored; the declaration was persisted.
    Created,
    /// A compatible schema already existed.
    Existing,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_schema_matches_record_layout() {
        let schema = IndexSchema::items();
        assert_eq!(schema.name, "idx:items");
        assert_eq!(schema.text_fields, vec!["title", "author", "description"]);
        assert_eq!(schema.vector_field, "embedding");
        assert_eq!(schema.dimension, 512);
        assert_eq!(schema.metric, DistanceMetric::Cosine);
    }

    #[test]
    fn incompatibility_reports_dimension() {
        let stored = IndexSchema::items();
        let declared = IndexSchema::items().with_dimension(384);
        let reason = stored.incompatibility(&declared).unwrap();
        assert!(reason.contains("512"));
        assert!(stored.incompatibility(&IndexSchema::items()).is_none());
    }
}
