//! JSONL corpus artifacts.
//!
//! Two files flow through the ingest pipeline:
//!
//! - `chunks.jsonl`: one [`ChunkRecord`] per line, written by the chunker
//! - `embedded.jsonl`: one [`EmbeddedChunk`] per line, the record plus its vector
//!
//! Loading an embedded file yields a [`Corpus`] whose matrix row `i` and
//! record `i` describe the same chunk.

use crate::record::{ChunkRecord, EmbeddedChunk};
use crate::{Result, RetrievalError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tomo_vector::EmbeddingMatrix;

/// An embedding matrix with its aligned metadata.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub embeddings: EmbeddingMatrix,
    pub records: Vec<ChunkRecord>,
}

impl Corpus {
    /// Pair a matrix with its records, checking they have the same length.
    pub fn new(embeddings: EmbeddingMatrix, records: Vec<ChunkRecord>) -> Result<Self> {
        if embeddings.len() != records.len() {
            return Err(RetrievalError::MisalignedMetadata {
                embeddings: embeddings.len(),
                metadata: records.len(),
            });
        }
        Ok(Self { embeddings, records })
    }

    /// Build a corpus from embedded chunks, in order.
    pub fn from_embedded(chunks: Vec<EmbeddedChunk>) -> Result<Self> {
        let embeddings = EmbeddingMatrix::from_rows(
            &chunks.iter().map(|c| c.embedding.as_slice()).collect::<Vec<_>>(),
        )?;
        let records = chunks.into_iter().map(|c| c.record).collect();
        Self::new(embeddings, records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Load an embedded corpus from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let corpus = Self::from_embedded(read_embedded(path)?)?;
        tracing::info!(
            "Loaded corpus {}: chunks={}, dimensions={}",
            path.display(),
            corpus.len(),
            corpus.embeddings.dimensions()
        );
        Ok(corpus)
    }
}

/// Read chunk records from a JSONL file.
pub fn read_chunks(path: impl AsRef<Path>) -> Result<Vec<ChunkRecord>> {
    read_jsonl(path.as_ref())
}

/// Write chunk records as JSONL.
pub fn write_chunks(path: impl AsRef<Path>, records: &[ChunkRecord]) -> Result<()> {
    write_jsonl(path.as_ref(), records)
}

/// Read embedded chunks from a JSONL file.
pub fn read_embedded(path: impl AsRef<Path>) -> Result<Vec<EmbeddedChunk>> {
    read_jsonl(path.as_ref())
}

/// Write embedded chunks as JSONL.
pub fn write_embedded(path: impl AsRef<Path>, chunks: &[EmbeddedChunk]) -> Result<()> {
    write_jsonl(path.as_ref(), chunks)
}

/// Parse one value per non-blank line. Errors carry the 1-based line number.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let reader = BufReader::new(File::open(path)?);
    let mut items = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let item = serde_json::from_str(&line).map_err(|e| RetrievalError::Parse {
            path: path.display().to_string(),
            line: i + 1,
            message: e.to_string(),
        })?;
        items.push(item);
    }

    Ok(items)
}

fn write_jsonl<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for item in items {
        serde_json::to_writer(&mut writer, item).map_err(std::io::Error::from)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}
