//! Backend selection and the [`Index`] handle.
//!
//! Two backends implement [`SimilarityIndex`]: the accelerated flat
//! inner-product index (feature `accelerated`) and the brute force scan.
//! Which one is used is decided here, once, and nowhere else:
//!
//! ```text
//! build_index(matrix)
//!   -> BackendKind::detect()        (cached for the process)
//!   -> build_index_with(matrix, kind)
//!        Accelerated -> FlatIpIndex  (falls back to BruteForce on failure)
//!        BruteForce  -> BruteForceIndex
//! ```

use crate::brute::BruteForceIndex;
#[cfg(feature = "accelerated")]
use crate::flat::FlatIpIndex;
use crate::matrix::EmbeddingMatrix;
use crate::traits::{ScoredChunk, SimilarityIndex};
use crate::{Result, VectorError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// The concrete search backend behind an [`Index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Flat inner-product index scanned on a worker pool.
    Accelerated,
    /// Single-threaded full scan.
    BruteForce,
}

impl BackendKind {
    /// Whether the accelerated backend was compiled in.
    pub fn accelerated_available() -> bool {
        cfg!(feature = "accelerated")
    }

    /// The backend to use for this process.
    ///
    /// Decided on first call and cached; a missing accelerated backend is
    /// logged once and replaced by the brute force scan.
    pub fn detect() -> Self {
        static DETECTED: OnceLock<BackendKind> = OnceLock::new();
        *DETECTED.get_or_init(|| {
            if Self::accelerated_available() {
                tracing::info!("Accelerated similarity backend available");
                BackendKind::Accelerated
            } else {
                tracing::warn!(
                    "Accelerated similarity backend not compiled in, using brute force"
                );
                BackendKind::BruteForce
            }
        })
    }

    /// Short stable name, used in logs and health output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Accelerated => "flat-ip",
            Self::BruteForce => "brute-force",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configured backend choice, resolved to a [`BackendKind`] at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendPreference {
    /// Accelerated when available, brute force otherwise.
    #[default]
    Auto,
    /// Ask for the accelerated backend; still falls back if unavailable.
    Accelerated,
    /// Always use the brute force scan.
    BruteForce,
}

impl BackendPreference {
    /// Resolve the preference against what this build supports.
    pub fn resolve(self) -> BackendKind {
        match self {
            Self::Auto => BackendKind::detect(),
            Self::Accelerated => {
                if BackendKind::accelerated_available() {
                    BackendKind::Accelerated
                } else {
                    tracing::warn!(
                        "Accelerated backend requested but not compiled in, using brute force"
                    );
                    BackendKind::BruteForce
                }
            }
            Self::BruteForce => BackendKind::BruteForce,
        }
    }
}

impl FromStr for BackendPreference {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "accelerated" | "flat-ip" | "flat_ip" => Ok(Self::Accelerated),
            "brute_force" | "brute-force" | "brute" => Ok(Self::BruteForce),
            other => Err(VectorError::UnknownBackend(other.to_string())),
        }
    }
}

/// A built, immutable similarity index.
///
/// Callers only ever see this handle; the backend inside is chosen by
/// [`build_index`] / [`build_index_with`].
#[derive(Debug)]
pub enum Index {
    BruteForce(BruteForceIndex),
    #[cfg(feature = "accelerated")]
    Accelerated(FlatIpIndex),
}

impl Index {
    fn inner(&self) -> &dyn SimilarityIndex {
        match self {
            Self::BruteForce(index) => index,
            #[cfg(feature = "accelerated")]
            Self::Accelerated(index) => index,
        }
    }
}

impl SimilarityIndex for Index {
    fn build(embeddings: &EmbeddingMatrix) -> Result<Self> {
        build_index(embeddings)
    }

    fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        self.inner().search(query, top_k)
    }

    fn vector(&self, index: usize) -> Option<&[f32]> {
        self.inner().vector(index)
    }

    fn len(&self) -> usize {
        self.inner().len()
    }

    fn dimensions(&self) -> usize {
        self.inner().dimensions()
    }

    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }
}

/// Build an index with the process-wide backend (see [`BackendKind::detect`]).
pub fn build_index(embeddings: &EmbeddingMatrix) -> Result<Index> {
    build_index_with(embeddings, BackendKind::detect())
}

/// Build an index with a specific backend.
///
/// If the accelerated backend cannot be started the brute force index is
/// built instead; that is logged, not returned as an error.
///
/// # Errors
///
/// - `InvalidVector` if a row contains NaN or infinite values
pub fn build_index_with(embeddings: &EmbeddingMatrix, kind: BackendKind) -> Result<Index> {
    let index = match kind {
        BackendKind::Accelerated => build_accelerated(embeddings)?,
        BackendKind::BruteForce => Index::BruteForce(BruteForceIndex::build(embeddings)?),
    };

    tracing::info!(
        "Built similarity index: rows={}, dimensions={}, backend={}",
        index.len(),
        index.dimensions(),
        index.kind()
    );

    Ok(index)
}

#[cfg(feature = "accelerated")]
fn build_accelerated(embeddings: &EmbeddingMatrix) -> Result<Index> {
    match FlatIpIndex::build(embeddings) {
        Ok(index) => Ok(Index::Accelerated(index)),
        Err(VectorError::BackendUnavailable(reason)) => {
            tracing::warn!(
                "Accelerated backend unavailable ({}), falling back to brute force",
                reason
            );
            Ok(Index::BruteForce(BruteForceIndex::build(embeddings)?))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "accelerated"))]
fn build_accelerated(embeddings: &EmbeddingMatrix) -> Result<Index> {
    tracing::warn!("Accelerated backend not compiled in, falling back to brute force");
    Ok(Index::BruteForce(BruteForceIndex::build(embeddings)?))
}

/// Return up to `top_k` `(index, score)` hits for `query`.
///
/// See [`SimilarityIndex::search`] for ordering and errors.
pub fn search(index: &Index, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
    let results = index.search(query, top_k)?;
    tracing::debug!(
        "Search: backend={}, top_k={}, returned={}",
        index.kind(),
        top_k,
        results.len()
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_parsing() {
        assert_eq!("auto".parse::<BackendPreference>().unwrap(), BackendPreference::Auto);
        assert_eq!(
            "Flat-IP".parse::<BackendPreference>().unwrap(),
            BackendPreference::Accelerated
        );
        assert_eq!(
            " brute_force ".parse::<BackendPreference>().unwrap(),
            BackendPreference::BruteForce
        );
        assert!(matches!(
            "faiss".parse::<BackendPreference>(),
            Err(VectorError::UnknownBackend(_))
        ));
    }

    #[test]
    fn test_preference_serde() {
        let p: BackendPreference = serde_json::from_str("\"brute_force\"").unwrap();
        assert_eq!(p, BackendPreference::BruteForce);
        assert_eq!(serde_json::to_string(&BackendKind::Accelerated).unwrap(), "\"accelerated\"");
    }

    #[test]
    fn test_detect_is_stable() {
        assert_eq!(BackendKind::detect(), BackendKind::detect());
        if BackendKind::accelerated_available() {
            assert_eq!(BackendKind::detect(), BackendKind::Accelerated);
        } else {
            assert_eq!(BackendKind::detect(), BackendKind::BruteForce);
        }
    }

    #[test]
    fn test_brute_force_preference_is_honored() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0]]).unwrap();
        let index = build_index_with(&m, BackendPreference::BruteForce.resolve()).unwrap();
        assert_eq!(index.kind(), BackendKind::BruteForce);
    }

    #[test]
    fn test_accelerated_request_resolves() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0]]).unwrap();
        let index = build_index_with(&m, BackendKind::Accelerated).unwrap();
        if BackendKind::accelerated_available() {
            assert_eq!(index.kind(), BackendKind::Accelerated);
        } else {
            assert_eq!(index.kind(), BackendKind::BruteForce);
        }
    }

    #[cfg(not(feature = "accelerated"))]
    #[test]
    fn test_brute_force_only_build() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();

        assert!(!BackendKind::accelerated_available());
        assert_eq!(BackendKind::detect(), BackendKind::BruteForce);
        assert_eq!(BackendPreference::Accelerated.resolve(), BackendKind::BruteForce);

        let index = build_index_with(&m, BackendKind::Accelerated).unwrap();
        assert_eq!(index.kind(), BackendKind::BruteForce);
        let results = search(&index, &[0.0, 1.0], 1).unwrap();
        assert_eq!(results[0].index, 1);
    }

    #[test]
    fn test_index_handle_delegates() {
        let m = EmbeddingMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![0.9, 0.1]])
            .unwrap();
        let index = build_index(&m).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.dimensions(), 2);
        assert!(index.vector(3).is_none());

        let results = search(&index, &[1.0, 0.0], 2).unwrap();
        let order: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![0, 2]);
    }

    #[test]
    fn test_invalid_input_is_not_masked_by_fallback() {
        let m = EmbeddingMatrix::from_rows(&[vec![f32::NAN, 0.0]]).unwrap();
        assert!(matches!(
            build_index_with(&m, BackendKind::Accelerated),
            Err(VectorError::InvalidVector(_))
        ));
    }
}
