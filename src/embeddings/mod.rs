
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::{RagError, Result};

/// Upper bound on inputs per provider request
pub const MAX_EMBED_BATCH_SIZE: usize = 1024;

/// Client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Large inputs are partitioned into sub-batches that are dispatched
/// concurrently and joined all-or-nothing: a failure in any sub-batch fails
/// the whole call and no partial results are returned.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    #[inline]
    pub fn new(
        provider: &ProviderConfig,
        http: reqwest::Client,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: provider.base_url.trim_end_matches('/').to_string(),
            model: provider.embedding_model.clone(),
            api_key: api_key.into(),
            batch_size: provider.embed_batch_size.clamp(1, MAX_EMBED_BATCH_SIZE),
        }
    }

    #[inline]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_EMBED_BATCH_SIZE);
        self
    }

    /// Embed a batch of texts, one vector per input in the same order.
    ///
    /// Sub-batches run concurrently; completion order cannot reorder the
    /// output because results are joined positionally.
    #[inline]
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Embedding {} texts in sub-batches of {}",
            texts.len(),
            self.batch_size
        );

        let sub_batches = texts
            .chunks(self.batch_size)
            .map(|batch| self.embed_sub_batch(batch));
        let results = future::try_join_all(sub_batches).await?;
        let vectors: Vec<Vec<f32>> = results.into_iter().flatten().collect();

        if vectors.len() != texts.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "expected {} vectors, provider returned {}",
                texts.len(),
                vectors.len()
            )));
        }

        debug!("Generated {} embeddings", vectors.len());
        Ok(vectors)
    }

    /// Embed a single text on the non-batched call path, used for queries.
    #[inline]
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let input = [text.to_string()];
        let mut vectors = self.embed_sub_batch(&input).await?;
        vectors.pop().ok_or_else(|| {
            RagError::EmbeddingProvider("provider returned no embedding".to_string())
        })
    }

    async fn embed_sub_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::EmbeddingProvider(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::EmbeddingProvider(format!(
                "embedding request failed with status {status}: {body}"
            )));
        }

        let mut parsed: EmbeddingsResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingProvider(format!("failed to parse embedding response: {e}"))
        })?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::EmbeddingProvider(format!(
                "sub-batch of {} inputs returned {} embeddings",
                texts.len(),
                parsed.data.len()
            )));
        }

        // Providers return an index per embedding; order by it rather than
        // trusting response array order.
        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}
