//! Cosine-similarity search over chunk embeddings for Tomo.
//!
//! This crate provides the two pieces of the retrieval core:
//!
//! - **Index Builder**: [`build_index`] takes an N x D [`EmbeddingMatrix`],
//!   stores an L2-normalized private copy, and returns an immutable [`Index`]
//! - **Similarity Searcher**: [`search`] normalizes a query the same way and
//!   returns up to `top_k` [`ScoredChunk`]s, best first, ties by row index
//!
//! # Backends
//!
//! ```text
//! accelerated (feature, default): FlatIpIndex  - blocked parallel scan, bounded heaps
//! fallback:                       BruteForceIndex - full scan + sort
//! ```
//!
//! Both produce identical output for identical input; the choice only
//! affects speed. See [`BackendKind::detect`].
//!
//! # Example
//!
//! ```
//! use tomo_vector::{build_index, search, EmbeddingMatrix};
//!
//! let embeddings = EmbeddingMatrix::from_rows(&[
//!     vec![1.0, 0.0],
//!     vec![0.0, 1.0],
//!     vec![0.9, 0.1],
//! ])
//! .unwrap();
//!
//! let index = build_index(&embeddings).unwrap();
//! let hits = search(&index, &[1.0, 0.0], 2).unwrap();
//!
//! assert_eq!(hits[0].index, 0);
//! assert!((hits[0].score - 1.0).abs() < 1e-4);
//! assert_eq!(hits[1].index, 2);
//! ```

mod backend;
mod brute;
mod distance;
#[cfg(feature = "accelerated")]
mod flat;
mod matrix;
mod traits;

pub use backend::{build_index, build_index_with, search, BackendKind, BackendPreference, Index};
pub use brute::BruteForceIndex;
pub use distance::{cosine_similarity, inner_product, l2_norm, normalize, NORM_EPSILON};
#[cfg(feature = "accelerated")]
pub use flat::{FlatIpIndex, ROWS_PER_BLOCK};
pub use matrix::EmbeddingMatrix;
pub use traits::{ScoredChunk, SimilarityIndex};

/// Error type for index construction and search.
#[derive(Debug, thiserror::Error)]
pub enum VectorError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Ragged embedding matrix: row {row} has {actual} values, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid top_k: {0} (must be >= 1)")]
    InvalidTopK(usize),

    #[error("Invalid vector: {0}")]
    InvalidVector(String),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Result type for vector operations.
pub type Result<T> = std::result::Result<T, VectorError>;
