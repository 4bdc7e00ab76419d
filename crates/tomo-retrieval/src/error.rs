use thiserror::Error;
use tomo_vector::VectorError;

#[derive(Error, Debug)]
pub enum RetrievalError {
    /// The embedding function failed; no search could run.
    #[error("Retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The answer generator failed. Passages may still be available.
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Index error: {0}")]
    Index(#[from] VectorError),

    #[error("Metadata misaligned: {embeddings} embeddings but {metadata} metadata records")]
    MisalignedMetadata { embeddings: usize, metadata: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at {path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl RetrievalError {
    /// True for errors caused by the caller's request rather than the system.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::Index(VectorError::InvalidTopK(_)))
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
