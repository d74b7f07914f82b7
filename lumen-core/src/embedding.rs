//! Embedding vector operations

use crate::{LumenError, LumenResult, VectorError};
use serde::{Deserialize, Serialize};

/// Embedding vector with dynamic dimensions.
/// Supports any embedding model dimension (e.g., 384, 768, 1536, 3072).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    /// The embedding data as a vector of f32 values.
    pub data: Vec<f32>,
    /// Identifier of the model that produced this embedding.
    pub model_id: String,
    /// Number of dimensions (must match data.len()).
    pub dimensions: i32,
}

impl EmbeddingVector {
    /// Create a new embedding vector.
    pub fn new(data: Vec<f32>, model_id: String) -> Self {
        let dimensions = data.len() as i32;
        Self {
            data,
            model_id,
            dimensions,
        }
    }

    /// Squared euclidean distance between the unit-normalized forms of both
    /// vectors. Ranges over [0.0, 4.0]; 2.0 corresponds to orthogonal vectors.
    pub fn squared_l2_distance(&self, other: &EmbeddingVector) -> LumenResult<f32> {
        self.check_dimensions(other)?;
        let a = self.normalized();
        let b = other.normalized();
        Ok(a.data
            .iter()
            .zip(b.data.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum())
    }

    /// Return a copy scaled to unit length. Zero vectors are returned unchanged.
    pub fn normalized(&self) -> EmbeddingVector {
        let norm: f32 = self.data.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return self.clone();
        }
        EmbeddingVector {
            data: self.data.iter().map(|x| x / norm).collect(),
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
        }
    }

    /// Check if this vector has valid dimensions.
    pub fn is_valid(&self) -> bool {
        self.dimensions > 0
            && self.data.len() == self.dimensions as usize
            && self.data.iter().all(|v| v.is_finite())
    }

    fn check_dimensions(&self, other: &EmbeddingVector) -> LumenResult<()> {
        if self.dimensions != other.dimensions {
            return Err(LumenError::Vector(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: other.dimensions,
            }));
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(data: Vec<f32>) -> EmbeddingVector {
        EmbeddingVector::new(data, "model".to_string())
    }

    #[test]
    fn test_new_sets_dimensions() {
        let data = vec![0.0, 1.0, 0.5];
        let vec = vector(data.clone());
        assert_eq!(vec.dimensions, data.len() as i32);
        assert_eq!(vec.data, data);
    }

    #[test]
    fn test_is_valid_rejects_non_finite() {
        assert!(vector(vec![0.0, 1.0]).is_valid());
        assert!(!vector(vec![f32::NAN, 1.0]).is_valid());
        assert!(!vector(vec![]).is_valid());
    }

    #[test]
    fn test_squared_l2_orthogonal_is_two() {
        let a = vector(vec![3.0, 0.0]);
        let b = vector(vec![0.0, 5.0]);
        let d = a.squared_l2_distance(&b).unwrap();
        assert!((d - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_squared_l2_scale_invariant() {
        let a = vector(vec![1.0, 2.0, 3.0]);
        let b = vector(vec![2.0, 4.0, 6.0]);
        let d = a.squared_l2_distance(&b).unwrap();
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn test_squared_l2_opposite_is_four() {
        let a = vector(vec![1.0, 0.0]);
        let b = vector(vec![-1.0, 0.0]);
        let d = a.squared_l2_distance(&b).unwrap();
        assert!((d - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_squared_l2_dimension_mismatch() {
        let a = vector(vec![1.0, 0.0]);
        let b = vector(vec![1.0, 0.0, 0.0]);
        let err = a.squared_l2_distance(&b).unwrap_err();
        assert!(matches!(
            err,
            LumenError::Vector(VectorError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }
}
