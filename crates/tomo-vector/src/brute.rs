//! Brute force similarity index.
//!
//! Full scan: score every stored row, sort, truncate. O(n * d) per query.
//! This is the fallback backend and the reference the accelerated backend is
//! checked against.

use crate::backend::BackendKind;
use crate::distance::inner_product;
use crate::matrix::{prepare_query, EmbeddingMatrix};
use crate::traits::{ScoredChunk, SimilarityIndex};
use crate::{Result, VectorError};

/// Brute force index over a normalized copy of the embedding matrix.
///
/// # Performance
///
/// - Build: O(n * d) (one normalization pass)
/// - Search: O(n * d + n log n)
#[derive(Debug, Clone)]
pub struct BruteForceIndex {
    /// Normalized rows, aligned 1:1 with the input matrix
    vectors: EmbeddingMatrix,
}

impl BruteForceIndex {
    /// Score every row against an already-normalized query.
    fn score_all(&self, query: &[f32]) -> Vec<ScoredChunk> {
        self.vectors
            .rows()
            .enumerate()
            .map(|(index, row)| ScoredChunk::new(index, inner_product(query, row)))
            .collect()
    }
}

impl SimilarityIndex for BruteForceIndex {
    fn build(embeddings: &EmbeddingMatrix) -> Result<Self> {
        embeddings.validate_finite()?;
        Ok(Self {
            vectors: embeddings.normalized(),
        })
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(VectorError::InvalidTopK(top_k));
        }

        if self.vectors.is_empty() {
            return Ok(vec![]);
        }

        let query = prepare_query(query, self.vectors.dimensions())?;

        let mut results = self.score_all(&query);
        results.sort();
        results.truncate(top_k);

        Ok(results)
    }

    fn vector(&self, index: usize) -> Option<&[f32]> {
        self.vectors.row(index)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> usize {
        self.vectors.dimensions()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::BruteForce
    }
}
