// crates/counsel-server/src/similarity/embedding.rs
// Dense sentence-embedding similarity via a local embeddings endpoint

use super::SimilarityBackend;
use crate::config::EmbeddingsConfig;
use crate::graph::cache::SimilarityCache;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding-based similarity backend.
///
/// Fetches a vector per text from an embeddings endpoint
/// (`POST {base_url}/api/embeddings`, `{model, prompt}` body) and
/// cosine-compares the pair. Inference happens server-side, so the
/// event loop only suspends on HTTP I/O.
///
/// When a shared [`SimilarityCache`] handle is attached, vectors are
/// served from the permanent L2 tier and only computed once per text;
/// the endpoint is consulted solely on L2 misses.
pub struct EmbeddingBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    cache: Option<Arc<SimilarityCache>>,
}

impl EmbeddingBackend {
    pub fn new(config: &EmbeddingsConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Construct with a shared cache whose L2 tier backs `embed()`.
    pub fn with_cache(config: &EmbeddingsConfig, cache: Arc<SimilarityCache>) -> Result<Self> {
        Self::build(config, Some(cache))
    }

    fn build(config: &EmbeddingsConfig, cache: Option<Arc<SimilarityCache>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            cache,
        })
    }

    /// Embed one text, consulting L2 before touching the endpoint.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get_cached_embedding(text) {
                debug!(dim = hit.len(), "Embedding served from L2 cache");
                return Ok(hit);
            }
        }

        let embedding = self.fetch_embedding(text).await?;
        if let Some(cache) = &self.cache {
            cache.cache_embedding(text, embedding.clone());
        }
        Ok(embedding)
    }

    async fn fetch_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "model": self.model, "prompt": text }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("embeddings endpoint returned {status}: {body}"));
        }
        let parsed: EmbeddingResponse = response.json().await?;
        if parsed.embedding.is_empty() {
            return Err(anyhow!("embeddings endpoint returned an empty vector"));
        }
        debug!(dim = parsed.embedding.len(), "Fetched embedding");
        Ok(parsed.embedding)
    }
}

/// Cosine similarity of two vectors, clamped to [0, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[async_trait]
impl SimilarityBackend for EmbeddingBackend {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64> {
        let (va, vb) = tokio::try_join!(self.embed(a), self.embed(b))?;
        Ok(cosine_similarity(&va, &vb))
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}
