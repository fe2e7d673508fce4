
use std::cmp::Ordering;

use tracing::debug;

use crate::Result;
use crate::chunking::Chunk;
use crate::embeddings::EmbeddingClient;

/// A chunk paired with its embedding vector, owned by one [`VectorIndex`]
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// In-memory vector index for one session's document.
///
/// Stores entries in insertion order and answers top-k queries with a
/// brute-force cosine scan. At the expected corpus size of at most a few
/// thousand chunks a linear scan is the intended design, not a shortcut.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    source_filename: String,
}

impl VectorIndex {
    /// Bulk-construct an index from chunk/vector pairs.
    #[inline]
    pub fn build(
        source_filename: impl Into<String>,
        entries: impl IntoIterator<Item = (Chunk, Vec<f32>)>,
    ) -> Self {
        let entries: Vec<IndexEntry> = entries
            .into_iter()
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let source_filename = source_filename.into();

        debug!(
            "Built vector index for '{}' with {} entries",
            source_filename,
            entries.len()
        );

        Self {
            entries,
            source_filename,
        }
    }

    /// Return the `min(k, len)` most similar chunks by descending cosine
    /// similarity. Equal scores break ties by ascending `sequence_index`,
    /// so results are deterministic for a fixed index and query.
    #[inline]
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query_vector, &entry.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });
        hits.truncate(k);
        hits
    }

    /// Ranked chunk texts only, the form consumed for prompt assembly.
    #[inline]
    pub fn search_as_text(&self, query_vector: &[f32], k: usize) -> Vec<String> {
        self.search(query_vector, k)
            .into_iter()
            .map(|hit| hit.chunk.text)
            .collect()
    }

    /// Embed the query text on the single-call path and search with it.
    #[inline]
    pub async fn search_text(
        &self,
        embedder: &EmbeddingClient,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<SearchHit>> {
        let query_vector = embedder.embed_one(query_text).await?;
        Ok(self.search(&query_vector, k))
    }

    /// [`Self::search_text`] reduced to the ranked chunk texts.
    #[inline]
    pub async fn search_text_as_text(
        &self,
        embedder: &EmbeddingClient,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<String>> {
        let query_vector = embedder.embed_one(query_text).await?;
        Ok(self.search_as_text(&query_vector, k))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }
}

/// Cosine similarity between two vectors. Mismatched lengths or a
/// zero-magnitude vector score 0.0 rather than NaN.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot / denominator
}
