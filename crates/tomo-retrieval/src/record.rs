//! Chunk metadata records.

use serde::{Deserialize, Serialize};

/// Source label used when a record does not name one.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// Metadata for one chunk, aligned with embedding row `i`.
///
/// Missing fields deserialize to defaults: `text` to `""`, `source` to
/// [`UNKNOWN_SOURCE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Identifier assigned at chunking time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<usize>,
    /// Chunk body text.
    #[serde(default)]
    pub text: String,
    /// Label of the document the chunk came from.
    #[serde(default = "default_source")]
    pub source: String,
}

impl ChunkRecord {
    pub fn new(id: usize, text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            text: text.into(),
            source: source.into(),
        }
    }
}

impl Default for ChunkRecord {
    fn default() -> Self {
        Self {
            id: None,
            text: String::new(),
            source: default_source(),
        }
    }
}

fn default_source() -> String {
    UNKNOWN_SOURCE.to_string()
}

/// One line of an embedded corpus file: the record plus its vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    #[serde(flatten)]
    pub record: ChunkRecord,
    /// Model embedding of `record.text`.
    pub embedding: Vec<f32>,
}
