//! Retrieval façade for Tomo.
//!
//! Binds an embedding function, the similarity index from `tomo-vector`, and
//! the chunk metadata into one immutable [`Retriever`]:
//!
//! ```text
//! question --Embedder--> query vector --tomo_vector::search--> (index, score)*
//!          --join metadata--> RetrievedPassage* --threshold gate--> Retrieval
//!          --optional Generator--> Answer
//! ```
//!
//! Also provides the ingest-side pieces used by the CLI: the paragraph
//! [`chunker`], JSONL [`corpus`] files, and OpenAI-compatible HTTP clients
//! for embeddings and chat completions.

pub mod chunker;
pub mod corpus;
mod embedder;
mod error;
mod generator;
mod record;
mod retriever;

pub use chunker::{chunk_records, chunk_text, ChunkerConfig};
pub use corpus::Corpus;
pub use embedder::{Embedder, EmbedderConfig, OpenAiEmbedder};
pub use error::{Result, RetrievalError};
pub use generator::{build_prompt, Generator, GeneratorConfig, OpenAiGenerator, SYSTEM_PROMPT};
pub use record::{ChunkRecord, EmbeddedChunk, UNKNOWN_SOURCE};
pub use retriever::{build_context, gate, Answer, RetrievedPassage, Retrieval, Retriever, RetrieverConfig};
