//! Core vector data structure.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XiphosError};

/// Identifier of a stored vector. Ties in search results are broken by
/// ascending identifier.
pub type VectorId = String;

/// An identified point in the metric space.
///
/// Vectors are immutable once inserted; indexes share them behind `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vector {
    /// Unique identifier.
    pub id: VectorId,
    /// Coordinates.
    pub data: Vec<f32>,
    /// Optional metadata associated with this vector.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Vector {
    /// Create a new vector.
    pub fn new<S: Into<VectorId>>(id: S, data: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            data,
            metadata: HashMap::new(),
        }
    }

    /// Create a new vector with metadata.
    pub fn with_metadata<S: Into<VectorId>>(
        id: S,
        data: Vec<f32>,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            metadata,
        }
    }

    /// Get the dimensionality of this vector.
    pub fn dimension(&self) -> usize {
        self.data.len()
    }

    /// Add metadata to this vector.
    pub fn add_metadata(&mut self, key: String, value: String) {
        self.metadata.insert(key, value);
    }

    /// Get metadata by key.
    pub fn get_metadata(&self, key: &str) -> Option<&String> {
        self.metadata.get(key)
    }

    /// Check the identifier is usable.
    pub fn validate_id(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(XiphosError::invalid_argument(
                "vector id must be a non-empty string",
            ));
        }
        Ok(())
    }

    /// Whether `other` has bit-identical coordinates.
    pub fn same_coordinates(&self, other: &[f32]) -> bool {
        self.data.len() == other.len()
            && self
                .data
                .iter()
                .zip(other)
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
