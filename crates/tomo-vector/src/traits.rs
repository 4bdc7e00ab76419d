//! Core traits for similarity indices.
//!
//! The `SimilarityIndex` trait is the one capability contract both search
//! backends (brute force and flat inner-product) implement.

use crate::backend::BackendKind;
use crate::matrix::EmbeddingMatrix;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A ranked hit: chunk row index plus cosine similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// Row index of the chunk in the embedding matrix.
    pub index: usize,
    /// Cosine similarity in [-1, 1] (higher = more similar).
    pub score: f32,
}

impl ScoredChunk {
    /// Create a new scored chunk.
    pub fn new(index: usize, score: f32) -> Self {
        Self { index, score }
    }
}

impl Eq for ScoredChunk {}

impl PartialOrd for ScoredChunk {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredChunk {
    /// Rank order: `Less` means "ranks earlier".
    ///
    /// Higher score first, ties by ascending index. `total_cmp` keeps the
    /// order total even for values that compare equal under `==`.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Common interface for similarity indices.
///
/// An index is built once from an embedding matrix and is read-only after
/// that. Implementations hold no interior mutability, so `&self` searches
/// from many threads at once need no locking.
pub trait SimilarityIndex: Send + Sync {
    /// Build an index from `embeddings`.
    ///
    /// The implementation stores its own L2-normalized copy; the input is
    /// never modified.
    ///
    /// # Errors
    ///
    /// - `InvalidVector` if a row contains NaN or infinite values
    fn build(embeddings: &EmbeddingMatrix) -> Result<Self>
    where
        Self: Sized;

    /// Return up to `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending score, ties by ascending index.
    /// An empty index returns an empty vector for any query.
    ///
    /// # Errors
    ///
    /// - `InvalidTopK` if `top_k` is zero
    /// - `DimensionMismatch` if the query length differs from the index
    /// - `InvalidVector` if the query contains NaN or infinite values
    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// The stored (normalized) vector for row `index`.
    fn vector(&self, index: usize) -> Option<&[f32]>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Check if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dimension of indexed vectors (0 for an index built from nothing).
    fn dimensions(&self) -> usize;

    /// Which backend this is.
    fn kind(&self) -> BackendKind;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_chunk_ordering() {
        let a = ScoredChunk::new(0, 0.5);
        let b = ScoredChunk::new(1, 0.9);
        let c = ScoredChunk::new(2, 0.1);

        let mut hits = vec![a, b, c];
        hits.sort();

        assert_eq!(hits[0].index, 1);
        assert_eq!(hits[1].index, 0);
        assert_eq!(hits[2].index, 2);
    }

    #[test]
    fn test_ties_break_by_index() {
        let mut hits = vec![
            ScoredChunk::new(7, 0.25),
            ScoredChunk::new(3, 0.25),
            ScoredChunk::new(5, 0.75),
            ScoredChunk::new(1, 0.25),
        ];
        hits.sort();

        let order: Vec<usize> = hits.iter().map(|h| h.index).collect();
        assert_eq!(order, vec![5, 1, 3, 7]);
    }
}
