//! Accelerated flat inner-product index.
//!
//! Rows are stored normalized in one contiguous buffer, so the inner product
//! of a normalized query with a row is its cosine similarity. Search splits
//! the buffer into fixed-size row blocks, scans the blocks in parallel on a
//! dedicated rayon pool keeping a bounded top-k heap per block, and merges
//! the heaps. The result is exact: the same scores and the same order as
//! [`BruteForceIndex`](crate::BruteForceIndex).

use crate::backend::BackendKind;
use crate::distance::inner_product;
use crate::matrix::{prepare_query, EmbeddingMatrix};
use crate::traits::{ScoredChunk, SimilarityIndex};
use crate::{Result, VectorError};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

/// Rows scanned per parallel task.
pub const ROWS_PER_BLOCK: usize = 1024;

/// Flat inner-product index backed by a rayon worker pool.
pub struct FlatIpIndex {
    /// Normalized rows, aligned 1:1 with the input matrix
    vectors: EmbeddingMatrix,
    /// Pool that runs block scans
    pool: Arc<ThreadPool>,
}

impl FlatIpIndex {
    /// Build with an explicit worker count (0 = one per CPU).
    ///
    /// # Errors
    ///
    /// - `InvalidVector` if a row contains NaN or infinite values
    /// - `BackendUnavailable` if the worker pool cannot be started
    pub fn with_threads(embeddings: &EmbeddingMatrix, threads: usize) -> Result<Self> {
        embeddings.validate_finite()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("tomo-scan-{}", i))
            .build()
            .map_err(|e| VectorError::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            vectors: embeddings.normalized(),
            pool: Arc::new(pool),
        })
    }

    /// Number of worker threads in the scan pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Scan one block of rows starting at row `base`.
    fn scan_block(
        query: &[f32],
        rows: &[f32],
        dims: usize,
        base: usize,
        k: usize,
    ) -> BinaryHeap<ScoredChunk> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (offset, row) in rows.chunks_exact(dims).enumerate() {
            let hit = ScoredChunk::new(base + offset, inner_product(query, row));
            push_bounded(&mut heap, hit, k);
        }
        heap
    }
}

/// Keep the `k` best-ranked hits in a max-heap whose top is the worst kept.
fn push_bounded(heap: &mut BinaryHeap<ScoredChunk>, hit: ScoredChunk, k: usize) {
    if heap.len() < k {
        heap.push(hit);
    } else if let Some(worst) = heap.peek() {
        if hit < *worst {
            heap.pop();
            heap.push(hit);
        }
    }
}

impl SimilarityIndex for FlatIpIndex {
    fn build(embeddings: &EmbeddingMatrix) -> Result<Self> {
        Self::with_threads(embeddings, 0)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        if top_k == 0 {
            return Err(VectorError::InvalidTopK(top_k));
        }

        if self.vectors.is_empty() {
            return Ok(vec![]);
        }

        let dims = self.vectors.dimensions();
        let query = prepare_query(query, dims)?;
        let k = top_k.min(self.vectors.len());
        let data = self.vectors.as_slice();

        let heap = if self.vectors.len() <= ROWS_PER_BLOCK {
            Self::scan_block(&query, data, dims, 0, k)
        } else {
            let partials: Vec<BinaryHeap<ScoredChunk>> = self.pool.install(|| {
                data.par_chunks(ROWS_PER_BLOCK * dims)
                    .enumerate()
                    .map(|(block, rows)| {
                        Self::scan_block(&query, rows, dims, block * ROWS_PER_BLOCK, k)
                    })
                    .collect()
            });

            let mut merged = BinaryHeap::with_capacity(k + 1);
            for hit in partials.into_iter().flat_map(BinaryHeap::into_vec) {
                push_bounded(&mut merged, hit, k);
            }
            merged
        };

        let mut results = heap.into_vec();
        results.sort();
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
        BackendKind::Accelerated
    }
}

impl fmt::Debug for FlatIpIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatIpIndex")
            .field("rows", &self.vectors.len())
            .field("dimensions", &self.vectors.dimensions())
            .field("threads", &self.threads())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brute::BruteForceIndex;

    fn matrix(n: usize, dims: usize) -> EmbeddingMatrix {
        let rows: Vec<Vec<f32>> = (0..n)
            .map(|i| {
                (0..dims)
                    .map(|j| (((i * 31 + j * 17) % 97) as f32 / 97.0) - 0.5)
                    .collect()
            })
            .collect();
        EmbeddingMatrix::from_rows(&rows).unwrap()
    }

    #[test]
    fn test_three_chunk_scenario() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]]).unwrap();
        let index = FlatIpIndex::build(&m).unwrap();

        let results = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].index, 0);
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert_eq!(results[1].index, 2);
        assert!((results[1].score - 0.9939).abs() < 1e-3);
    }

    #[test]
    fn test_matches_brute_force_across_blocks() {
        // Spans several blocks, last one partial
        let m = matrix(ROWS_PER_BLOCK * 3 + 17, 24);
        let flat = FlatIpIndex::with_threads(&m, 4).unwrap();
        let brute = BruteForceIndex::build(&m).unwrap();

        let query: Vec<f32> = (0..24).map(|j| (j as f32 * 0.3).cos()).collect();
        for k in [1, 5, 64, ROWS_PER_BLOCK + 1, m.len(), m.len() + 10] {
            assert_eq!(flat.search(&query, k).unwrap(), brute.search(&query, k).unwrap());
        }
    }

    #[test]
    fn test_duplicate_rows_tie_break() {
        // Every row identical: order must be plain index order
        let rows = vec![vec![0.5f32, 0.5, 0.5]; ROWS_PER_BLOCK + 50];
        let m = EmbeddingMatrix::from_rows(&rows).unwrap();
        let index = FlatIpIndex::with_threads(&m, 3).unwrap();

        let results = index.search(&[1.0, 1.0, 1.0], 10).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_and_invalid() {
        let index = FlatIpIndex::build(&EmbeddingMatrix::empty(4)).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().is_empty());
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0, 0.0], 0),
            Err(VectorError::InvalidTopK(0))
        ));

        let index = FlatIpIndex::build(&matrix(4, 4)).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(VectorError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_and_threads() {
        let index = FlatIpIndex::with_threads(&matrix(2, 2), 2).unwrap();
        assert_eq!(index.kind(), BackendKind::Accelerated);
        assert_eq!(index.threads(), 2);
    }
}
