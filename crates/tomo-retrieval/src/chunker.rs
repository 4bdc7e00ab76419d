//! Paragraph-greedy text chunker.
//!
//! Paragraphs (separated by a blank line) are packed into chunks of at most
//! `max_chars` characters. A paragraph too long to fit on its own is cut into
//! `max_chars` pieces, each next piece starting `overlap` characters before
//! the previous cut so context carries across the boundary.
//!
//! Lengths count `char`s, not bytes, so multi-byte text is never split inside
//! a code point.

use crate::record::ChunkRecord;
use crate::{Result, RetrievalError};
use serde::{Deserialize, Serialize};

/// Chunk size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Characters repeated at the start of the next piece of a split paragraph.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            overlap: default_overlap(),
        }
    }
}

fn default_max_chars() -> usize {
    1000
}

fn default_overlap() -> usize {
    200
}

impl ChunkerConfig {
    /// Validate limits. `overlap` must leave room to make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 {
            return Err(RetrievalError::Config("max_chars must be > 0".to_string()));
        }
        if self.overlap >= self.max_chars {
            return Err(RetrievalError::Config(format!(
                "overlap ({}) must be smaller than max_chars ({})",
                self.overlap, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Split `text` into chunks.
///
/// ```
/// use tomo_retrieval::{chunk_text, ChunkerConfig};
///
/// let config = ChunkerConfig { max_chars: 12, overlap: 4 };
/// let chunks = chunk_text("one\n\ntwo\n\nthree four five", &config).unwrap();
/// assert_eq!(chunks, vec!["one\n\ntwo", "three four f", "ur five"]);
/// ```
pub fn chunk_text(text: &str, config: &ChunkerConfig) -> Result<Vec<String>> {
    config.validate()?;

    let max = config.max_chars;
    let step = config.max_chars - config.overlap;

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let paragraph_chars = paragraph.chars().count();

        if current.is_empty() {
            current.push_str(paragraph);
            current_chars = paragraph_chars;
        } else if current_chars + 2 + paragraph_chars <= max {
            current.push_str("\n\n");
            current.push_str(paragraph);
            current_chars += 2 + paragraph_chars;
        } else {
            chunks.push(std::mem::replace(&mut current, paragraph.to_string()));
            current_chars = paragraph_chars;
        }

        while current_chars > max {
            chunks.push(current[..byte_offset(&current, max)].to_string());
            current = current[byte_offset(&current, step)..].to_string();
            current_chars -= step;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    Ok(chunks)
}

/// Chunk `text` into records labelled with `source`, numbered from 0.
pub fn chunk_records(text: &str, source: &str, config: &ChunkerConfig) -> Result<Vec<ChunkRecord>> {
    Ok(chunk_text(text, config)?
        .into_iter()
        .enumerate()
        .map(|(id, chunk)| ChunkRecord::new(id, chunk, source))
        .collect())
}

/// Byte offset of the `n`th character (or the end of the string).
fn byte_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}
