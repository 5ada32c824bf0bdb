use index::IndexError;
use thiserror::Error;

/// Input rejected before any mutation takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("embedding must be exactly {expected} bytes, got {got}")]
    EmbeddingLength { expected: usize, got: usize },

    #[error("embedding component {index} is not a finite number")]
    NonFiniteEmbedding { index: usize },

    #[error("embedding is not valid base64: {0}")]
    InvalidTransportEncoding(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported image content type: {0}")]
    UnsupportedContentType(String),

    #[error("image payload is empty")]
    EmptyImage,

    #[error("image is {size} bytes, max {max} allowed")]
    ImageTooLarge { size: usize, max: usize },

    #[error("k must be between 1 and {max}, got {k}")]
    InvalidK { k: usize, max: usize },
}

/// Errors returned by [`crate::ItemRepository`] operations.
///
/// A missing item is not an error: lookups and mutations of unknown ids
/// return `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RepositoryError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] IndexError),
}

impl RepositoryError {
    /// Label used by metrics observers.
    pub fn kind(&self) -> &'static str {
        match self {
            RepositoryError::Validation(_) => "validation",
            RepositoryError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
