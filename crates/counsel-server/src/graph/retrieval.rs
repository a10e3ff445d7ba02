// crates/counsel-server/src/graph/retrieval.rs
// Top-K retrieval of relevant past decisions

use super::cache::{ScoredDecision, SimilarityCache, SimilarityCacheStats};
use super::store::GraphStore;
use crate::config::DecisionGraphConfig;
use crate::error::Result;
use crate::similarity::SimilarityDetector;
use counsel_types::DecisionNode;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Retrieves past decisions relevant to a query question, consulting
/// the L1 cache before scanning the recent decision window.
pub struct DecisionRetriever {
    store: Arc<GraphStore>,
    detector: Arc<SimilarityDetector>,
    cache: Option<Arc<SimilarityCache>>,
    config: DecisionGraphConfig,
}

impl DecisionRetriever {
    pub fn new(
        store: Arc<GraphStore>,
        detector: Arc<SimilarityDetector>,
        config: DecisionGraphConfig,
    ) -> Self {
        let cache = Arc::new(SimilarityCache::new(
            config.query_cache_size,
            config.embedding_cache_size,
            Duration::from_secs(config.query_ttl_secs),
        ));
        Self::with_shared_cache(store, detector, cache, config)
    }

    /// Construct around an externally owned cache. The same handle
    /// should back the detector's embedding backend so L1 (query
    /// results) and L2 (embeddings) are tiers of one cache.
    pub fn with_shared_cache(
        store: Arc<GraphStore>,
        detector: Arc<SimilarityDetector>,
        cache: Arc<SimilarityCache>,
        config: DecisionGraphConfig,
    ) -> Self {
        Self {
            store,
            detector,
            cache: Some(cache),
            config,
        }
    }

    /// Construct with caching disabled; `cache_stats()` returns None.
    pub fn without_cache(
        store: Arc<GraphStore>,
        detector: Arc<SimilarityDetector>,
        config: DecisionGraphConfig,
    ) -> Self {
        Self {
            store,
            detector,
            cache: None,
            config,
        }
    }

    /// Find past decisions relevant to the query question.
    ///
    /// When `max_results` is None, an adaptive K is chosen from the
    /// database size: small DBs return more context, large DBs less.
    pub async fn find_relevant(
        &self,
        question: &str,
        threshold: f64,
        max_results: Option<usize>,
    ) -> Result<Vec<(DecisionNode, f64)>> {
        let k = match max_results {
            Some(k) => k,
            None => self.adaptive_k().await?,
        };

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get_cached_result(question, threshold, k) {
                debug!(results = cached.len(), "Retrieval served from L1 cache");
                return self.materialize(cached).await;
            }
        }

        let candidates = self
            .store
            .list_decisions(self.config.query_window, 0)
            .await?;

        let mut scored = Vec::new();
        for candidate in candidates {
            let score = self.detector.compute(question, &candidate.question).await;
            if score >= threshold {
                scored.push((candidate, score));
            }
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        if let Some(cache) = &self.cache {
            let entries = scored
                .iter()
                .map(|(node, score)| ScoredDecision {
                    decision_id: node.id.clone(),
                    score: *score,
                })
                .collect();
            cache.cache_result(question, threshold, k, entries);
        }

        debug!(
            results = scored.len(),
            threshold, k, "Retrieval computed from store"
        );
        Ok(scored)
    }

    /// Load cached (id, score) pairs back into full nodes. Entries whose
    /// decision has vanished are skipped.
    async fn materialize(&self, cached: Vec<ScoredDecision>) -> Result<Vec<(DecisionNode, f64)>> {
        let mut out = Vec::with_capacity(cached.len());
        for entry in cached {
            if let Some(node) = self.store.get_decision(&entry.decision_id).await? {
                out.push((node, entry.score));
            }
        }
        Ok(out)
    }

    /// Adaptive K by database size: ≤small → small_k, ≤medium →
    /// medium_k, else large_k.
    async fn adaptive_k(&self) -> Result<usize> {
        let count = self.store.count_decisions().await?;
        let k = if count <= self.config.adaptive_k_small_threshold {
            self.config.adaptive_k_small
        } else if count <= self.config.adaptive_k_medium_threshold {
            self.config.adaptive_k_medium
        } else {
            self.config.adaptive_k_large
        };
        debug!(db_size = count, k, "Adaptive K selected");
        Ok(k)
    }

    /// Event-invalidate the L1 query cache (new decision written).
    pub fn invalidate_queries(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all_queries();
        }
    }

    /// Cache statistics, or None when caching is disabled.
    pub fn cache_stats(&self) -> Option<SimilarityCacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }

    pub fn cache(&self) -> Option<&Arc<SimilarityCache>> {
        self.cache.as_ref()
    }
}
