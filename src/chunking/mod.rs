
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A bounded substring of a source document, the unit of retrieval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text
    pub text: String,
    /// Position of emission, stable and monotonically increasing within one document
    pub sequence_index: usize,
}

/// Configuration for splitting document text into chunks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    /// Validate that the window parameters can make forward progress.
    /// `chunk_overlap >= chunk_size` would produce a zero or negative step.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Split text into overlapping fixed-size character windows.
///
/// The window start advances by `chunk_size - chunk_overlap` until it reaches
/// the end of the text; the final chunk may be shorter than `chunk_size`.
/// Windows are measured in characters, not bytes, so multi-byte text never
/// splits inside a code point. Empty input yields no chunks.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let step = config.chunk_size - config.chunk_overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            sequence_index: chunks.len(),
        });
        start += step;
    }

    debug!(
        "Split {} chars into {} chunks (size {}, overlap {})",
        chars.len(),
        chunks.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    Ok(chunks)
}
