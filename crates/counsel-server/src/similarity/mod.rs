// crates/counsel-server/src/similarity/mod.rs
// Pluggable text similarity with automatic backend fallback

mod embedding;
mod jaccard;
mod tfidf;

pub use embedding::{EmbeddingBackend, cosine_similarity};
pub use jaccard::JaccardBackend;
pub use tfidf::TfidfBackend;

use crate::config::EmbeddingsConfig;
use crate::graph::cache::SimilarityCache;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Interchangeable similarity implementation: 0..1 semantic similarity
/// between two strings.
#[async_trait]
pub trait SimilarityBackend: Send + Sync {
    async fn similarity(&self, a: &str, b: &str) -> Result<f64>;

    fn name(&self) -> &'static str;
}

/// Similarity detector with an automatic fallback chain.
///
/// At construction: dense embeddings (when an endpoint is configured
/// and the client can be built) → TF-IDF → Jaccard. The chosen backend
/// is logged exactly once. Computation failures return 0.0 and log.
pub struct SimilarityDetector {
    backend: Box<dyn SimilarityBackend>,
}

impl SimilarityDetector {
    pub fn new(embeddings: Option<&EmbeddingsConfig>) -> Self {
        Self::build(embeddings, None)
    }

    /// Construct with a shared cache whose permanent L2 tier backs the
    /// embedding backend, so repeated embedding of the same text is
    /// computed once. TF-IDF and Jaccard need no cache.
    pub fn with_embedding_cache(
        embeddings: Option<&EmbeddingsConfig>,
        cache: Arc<SimilarityCache>,
    ) -> Self {
        Self::build(embeddings, Some(cache))
    }

    fn build(
        embeddings: Option<&EmbeddingsConfig>,
        cache: Option<Arc<SimilarityCache>>,
    ) -> Self {
        let backend: Box<dyn SimilarityBackend> = match embeddings {
            Some(config) => {
                let built = match cache {
                    Some(cache) => EmbeddingBackend::with_cache(config, cache),
                    None => EmbeddingBackend::new(config),
                };
                match built {
                    Ok(backend) => Box::new(backend),
                    Err(e) => {
                        warn!("Embedding backend unavailable ({e}), falling back to TF-IDF");
                        Box::new(TfidfBackend)
                    }
                }
            }
            None => Box::new(TfidfBackend),
        };
        info!(backend = backend.name(), "Similarity detector initialized");
        Self { backend }
    }

    /// Construct with an explicit backend (tests, or forcing the floor).
    pub fn with_backend(backend: Box<dyn SimilarityBackend>) -> Self {
        info!(backend = backend.name(), "Similarity detector initialized");
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Compute similarity between two texts, clamped to [0, 1].
    ///
    /// Empty inputs score 0; whitespace is normalized first; backend
    /// failures score 0 and log rather than propagate.
    pub async fn compute(&self, a: &str, b: &str) -> f64 {
        if a.trim().is_empty() || b.trim().is_empty() {
            return 0.0;
        }
        let a = normalize_whitespace(a);
        let b = normalize_whitespace(b);

        match self.backend.similarity(&a, &b).await {
            Ok(score) => score.clamp(0.0, 1.0),
            Err(e) => {
                error!(backend = self.backend.name(), "Similarity computation failed: {e}");
                0.0
            }
        }
    }
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
