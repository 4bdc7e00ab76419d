//! Dense row-major embedding storage.

use crate::distance::normalize_in_place;
use crate::{Result, VectorError};

/// An N x D matrix of embeddings, one row per chunk.
///
/// Rows are stored contiguously. Row `i` always corresponds to chunk `i`;
/// nothing in this crate reorders rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dimensions: usize,
}

impl EmbeddingMatrix {
    /// An empty matrix (zero rows) of the given dimension.
    pub fn empty(dimensions: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            dimensions,
        }
    }

    /// Build a matrix from individual rows.
    ///
    /// The first row fixes the dimension. Any later row of a different
    /// length fails with [`VectorError::RaggedMatrix`]; rows are never
    /// padded or truncated.
    ///
    /// ```
    /// use tomo_vector::EmbeddingMatrix;
    ///
    /// let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    /// assert_eq!(m.len(), 2);
    /// assert_eq!(m.dimensions(), 2);
    ///
    /// assert!(EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![1.0]]).is_err());
    /// ```
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let dimensions = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if !rows.is_empty() && dimensions == 0 {
            return Err(VectorError::InvalidVector(
                "embeddings must have at least one dimension".to_string(),
            ));
        }

        let mut data = Vec::with_capacity(rows.len() * dimensions);

        for (row, values) in rows.iter().enumerate() {
            let values = values.as_ref();
            if values.len() != dimensions {
                return Err(VectorError::RaggedMatrix {
                    row,
                    expected: dimensions,
                    actual: values.len(),
                });
            }
            data.extend_from_slice(values);
        }

        Ok(Self {
            data,
            rows: rows.len(),
            dimensions,
        })
    }

    /// Wrap an already-flattened row-major buffer.
    pub fn from_flat(data: Vec<f32>, dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            if !data.is_empty() {
                return Err(VectorError::InvalidVector(
                    "non-empty buffer with zero dimensions".to_string(),
                ));
            }
            return Ok(Self::empty(0));
        }

        if data.len() % dimensions != 0 {
            return Err(VectorError::RaggedMatrix {
                row: data.len() / dimensions,
                expected: dimensions,
                actual: data.len() % dimensions,
            });
        }

        let rows = data.len() / dimensions;
        Ok(Self {
            data,
            rows,
            dimensions,
        })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// True when the matrix has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Row width.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Borrow row `i`, or `None` if out of range.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        let start = i * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        // chunks_exact panics on a zero chunk size; a zero-width matrix has no rows
        self.data.chunks_exact(self.dimensions.max(1))
    }

    /// The whole row-major buffer.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// A copy with every row L2-normalized. `self` is left untouched.
    pub fn normalized(&self) -> Self {
        let mut out = self.clone();
        if self.dimensions > 0 {
            for row in out.data.chunks_exact_mut(self.dimensions) {
                normalize_in_place(row);
            }
        }
        out
    }

    /// Reject rows holding NaN or infinite values.
    pub(crate) fn validate_finite(&self) -> Result<()> {
        for (row, values) in self.rows().enumerate() {
            if let Some(col) = values.iter().position(|v| !v.is_finite()) {
                return Err(VectorError::InvalidVector(format!(
                    "non-finite value at row {}, column {}",
                    row, col
                )));
            }
        }
        Ok(())
    }
}

/// Check a query against the index dimension and return its normalized copy.
pub(crate) fn prepare_query(query: &[f32], dimensions: usize) -> Result<Vec<f32>> {
    if query.len() != dimensions {
        return Err(VectorError::DimensionMismatch {
            expected: dimensions,
            actual: query.len(),
        });
    }

    for (i, &v) in query.iter().enumerate() {
        if v.is_nan() {
            return Err(VectorError::InvalidVector(format!("NaN at index {}", i)));
        }
        if v.is_infinite() {
            return Err(VectorError::InvalidVector(format!("Inf at index {}", i)));
        }
    }

    let mut q = query.to_vec();
    normalize_in_place(&mut q);
    Ok(q)
}
