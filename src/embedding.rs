//! Embedding vectors and their two encodings: raw little-endian `f32` bytes
//! (storage and the repository API) and base64 of those bytes (transport).

use crate::error::ValidationError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use index::EMBEDDING_DIM;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Byte length of an encoded embedding.
pub const EMBEDDING_BYTES: usize = EMBEDDING_DIM * std::mem::size_of::<f32>();

/// A validated 512-component embedding.
///
/// Producers are expected to L2-normalize; the store never re-normalizes.
#[derive(Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Decode raw little-endian `f32` bytes.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, ValidationError> {
        if bytes.len() != EMBEDDING_BYTES {
            return Err(ValidationError::EmbeddingLength {
                expected: EMBEDDING_BYTES,
                got: bytes.len(),
            });
        }
        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Self::from_vec(values)
    }

    /// Decode the base64 transport form.
    pub fn from_base64(text: &str) -> Result<Self, ValidationError> {
        Self::from_le_bytes(&decode_base64(text)?)
    }

    pub fn from_vec(values: Vec<f32>) -> Result<Self, ValidationError> {
        if values.len() != EMBEDDING_DIM {
            return Err(ValidationError::EmbeddingLength {
                expected: EMBEDDING_BYTES,
                got: values.len() * std::mem::size_of::<f32>(),
            });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(ValidationError::NonFiniteEmbedding { index });
        }
        Ok(Self(values))
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        index::encode_vector(&self.0)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_le_bytes())
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

/// Decode the base64 transport form into raw bytes without checking their shape.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, ValidationError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| ValidationError::InvalidTransportEncoding(e.to_string()))
}

impl fmt::Debug for Embedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Embedding")
            .field("dim", &self.0.len())
            .field("head", &&self.0[..self.0.len().min(4)])
            .finish()
    }
}

impl Serialize for Embedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Embedding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Embedding::from_base64(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[axis] = 1.0;
        v
    }

    #[test]
    fn rejects_wrong_byte_length() {
        let err = Embedding::from_le_bytes(&[0u8; 2044]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::EmbeddingLength {
                expected: 2048,
                got: 2044
            }
        );
        assert!(Embedding::from_le_bytes(&[0u8; 4096]).is_err());
    }

    #[test]
    fn rejects_non_finite_components() {
        let mut values = unit(0);
        values[7] = f32::NAN;
        assert_eq!(
            Embedding::from_vec(values).unwrap_err(),
            ValidationError::NonFiniteEmbedding { index: 7 }
        );
    }

    #[test]
    fn base64_transport_preserves_values() {
        let embedding = Embedding::from_vec(unit(3)).unwrap();
        let text = embedding.to_base64();
        assert_eq!(Embedding::from_base64(&text).unwrap(), embedding);
        assert_eq!(embedding.to_le_bytes().len(), EMBEDDING_BYTES);
    }

    #[test]
    fn invalid_base64_is_a_validation_error() {
        assert!(matches!(
            Embedding::from_base64("not base64 !!"),
            Err(ValidationError::InvalidTransportEncoding(_))
        ));
    }

    #[test]
    fn serializes_as_base64_string() {
        let embedding = Embedding::from_vec(unit(0)).unwrap();
        let json = serde_json::to_string(&embedding).unwrap();
        assert_eq!(json, format!("\"{}\"", embedding.to_base64()));
        let back: Embedding = serde_json::from_str(&json).unwrap();
        assert_eq!(back, embedding);
    }
}
