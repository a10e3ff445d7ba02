// crates/counsel-server/src/graph/cache.rs
// Two-tier cache for similarity queries.
//
// L1 caches final top-k query results with a TTL and event-based
// invalidation on decision writes. L2 caches embedding vectors keyed by
// an embedding version; embeddings are immutable, so L2 has no TTL and
// survives decision writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bumped when the embedding model changes; stale vectors are then
/// unreachable and the operator clears L2 explicitly.
pub const EMBEDDING_VERSION: &str = "v1";

/// Statistics for a single cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    last_used: u64,
    expires_at: Option<Instant>,
}

/// LRU cache with optional per-entry TTL.
///
/// `get` promotes the key to most-recently-used unless it has expired;
/// expired entries are removed on access. Insertion beyond `maxsize`
/// evicts the least-recently-used key.
pub struct LruCache<V> {
    maxsize: usize,
    entries: HashMap<String, Entry<V>>,
    clock: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V: Clone> LruCache<V> {
    pub fn new(maxsize: usize) -> Self {
        Self {
            maxsize: maxsize.max(1),
            entries: HashMap::new(),
            clock: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.misses += 1;
                return None;
            }
            Some(entry) => entry
                .expires_at
                .map(|at| Instant::now() > at)
                .unwrap_or(false),
        };

        if expired {
            self.entries.remove(key);
            self.misses += 1;
            return None;
        }

        self.clock += 1;
        let clock = self.clock;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = clock;
        self.hits += 1;
        Some(entry.value.clone())
    }

    pub fn put(&mut self, key: String, value: V, ttl: Option<Duration>) {
        self.clock += 1;
        let entry = Entry {
            value,
            last_used: self.clock,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        self.entries.insert(key, entry);

        if self.entries.len() > self.maxsize {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
                self.evictions += 1;
            }
        }
    }

    pub fn invalidate(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        let count = self.entries.len();
        self.entries.clear();
        debug!("Cleared cache ({count} items removed)");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            size: self.entries.len(),
            hit_rate: if total > 0 {
                self.hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

/// One scored result held in the L1 query cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDecision {
    pub decision_id: String,
    pub score: f64,
}

/// Combined statistics across both tiers.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarityCacheStats {
    pub l1_query_cache: CacheStats,
    pub l2_embedding_cache: CacheStats,
    pub combined_hit_rate: f64,
    pub last_invalidation: Option<DateTime<Utc>>,
    pub query_ttl_secs: u64,
}

/// Two-tier cache: L1 query results (TTL, event-invalidated) and L2
/// embeddings (permanent, version-keyed).
pub struct SimilarityCache {
    query_cache: Mutex<LruCache<Vec<ScoredDecision>>>,
    embedding_cache: Mutex<LruCache<Vec<f32>>>,
    query_ttl: Duration,
    last_invalidation: Mutex<Option<DateTime<Utc>>>,
}

impl SimilarityCache {
    pub fn new(query_cache_size: usize, embedding_cache_size: usize, query_ttl: Duration) -> Self {
        info!(
            l1 = query_cache_size,
            l2 = embedding_cache_size,
            ttl_secs = query_ttl.as_secs(),
            "Initialized similarity cache"
        );
        Self {
            query_cache: Mutex::new(LruCache::new(query_cache_size)),
            embedding_cache: Mutex::new(LruCache::new(embedding_cache_size)),
            query_ttl,
            last_invalidation: Mutex::new(None),
        }
    }

    fn hash_question(question: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(question.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn query_key(question: &str, threshold: f64, max_results: usize) -> String {
        format!(
            "query:{}:{}:{}",
            Self::hash_question(question),
            threshold,
            max_results
        )
    }

    fn embedding_key(question: &str) -> String {
        format!("embed:{}:{EMBEDDING_VERSION}", Self::hash_question(question))
    }

    /// L1 lookup.
    pub fn get_cached_result(
        &self,
        question: &str,
        threshold: f64,
        max_results: usize,
    ) -> Option<Vec<ScoredDecision>> {
        let key = Self::query_key(question, threshold, max_results);
        let result = self.lock_queries().get(&key);
        if result.is_some() {
            debug!(threshold, max_results, "L1 cache hit");
        }
        result
    }

    /// L1 store (with the configured TTL).
    pub fn cache_result(
        &self,
        question: &str,
        threshold: f64,
        max_results: usize,
        results: Vec<ScoredDecision>,
    ) {
        let key = Self::query_key(question, threshold, max_results);
        self.lock_queries().put(key, results, Some(self.query_ttl));
    }

    /// L2 lookup.
    pub fn get_cached_embedding(&self, question: &str) -> Option<Vec<f32>> {
        self.lock_embeddings().get(&Self::embedding_key(question))
    }

    /// L2 store (no TTL; embeddings are immutable).
    pub fn cache_embedding(&self, question: &str, embedding: Vec<f32>) {
        self.lock_embeddings()
            .put(Self::embedding_key(question), embedding, None);
    }

    /// Event-based invalidation: empty L1 when a new decision lands.
    /// L2 is untouched.
    pub fn invalidate_all_queries(&self) {
        self.lock_queries().clear();
        *self.lock_invalidation() = Some(Utc::now());
        info!("Invalidated all L1 query results (new decision added to graph)");
    }

    /// Full clear of both tiers (embedding model change, debugging).
    pub fn invalidate_all(&self) {
        self.lock_queries().clear();
        self.lock_embeddings().clear();
        *self.lock_invalidation() = Some(Utc::now());
        warn!("Invalidated both cache tiers (full cache clear)");
    }

    pub fn stats(&self) -> SimilarityCacheStats {
        let l1 = self.lock_queries().stats();
        let l2 = self.lock_embeddings().stats();
        let total_hits = l1.hits + l2.hits;
        let total = l1.hits + l1.misses + l2.hits + l2.misses;
        SimilarityCacheStats {
            l1_query_cache: l1,
            l2_embedding_cache: l2,
            combined_hit_rate: if total > 0 {
                total_hits as f64 / total as f64
            } else {
                0.0
            },
            last_invalidation: *self.lock_invalidation(),
            query_ttl_secs: self.query_ttl.as_secs(),
        }
    }

    fn lock_queries(&self) -> std::sync::MutexGuard<'_, LruCache<Vec<ScoredDecision>>> {
        self.query_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_embeddings(&self) -> std::sync::MutexGuard<'_, LruCache<Vec<f32>>> {
        self.embedding_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_invalidation(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_invalidation
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // LruCache
    // ============================================================================

    #[test]
    fn test_get_miss_then_hit() {
        let mut cache: LruCache<i32> = LruCache::new(10);
        assert_eq!(cache.get("k"), None);
        cache.put("k".into(), 42, None);
        assert_eq!(cache.get("k"), Some(42));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_lru_eviction_keeps_recently_used() {
        let mut cache: LruCache<i32> = LruCache::new(3);
        cache.put("a".into(), 1, None);
        cache.put("b".into(), 2, None);
        cache.put("c".into(), 3, None);
        // Touch "a" so "b" becomes the LRU entry
        assert_eq!(cache.get("a"), Some(1));
        cache.put("d".into(), 4, None);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert!(cache.get("d").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_exact_capacity_after_overflow() {
        let mut cache: LruCache<usize> = LruCache::new(5);
        for i in 0..12 {
            cache.put(format!("k{i}"), i, None);
        }
        assert_eq!(cache.len(), 5);
        // The 5 most recently inserted survive
        for i in 7..12 {
            assert!(cache.get(&format!("k{i}")).is_some(), "k{i} should survive");
        }
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache: LruCache<i32> = LruCache::new(10);
        cache.put("k".into(), 1, Some(Duration::from_millis(30)));
        assert_eq!(cache.get("k"), Some(1));
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut cache: LruCache<i32> = LruCache::new(10);
        cache.put("k".into(), 1, None);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn test_put_overwrites_and_updates_ttl() {
        let mut cache: LruCache<i32> = LruCache::new(10);
        cache.put("k".into(), 1, Some(Duration::from_millis(10)));
        cache.put("k".into(), 2, None);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let mut cache: LruCache<i32> = LruCache::new(10);
        cache.put("a".into(), 1, None);
        cache.put("b".into(), 2, None);
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_maxsize_floor_of_one() {
        let mut cache: LruCache<i32> = LruCache::new(0);
        cache.put("a".into(), 1, None);
        cache.put("b".into(), 2, None);
        assert_eq!(cache.len(), 1);
    }

    // ============================================================================
    // SimilarityCache
    // ============================================================================

    fn scored(id: &str, score: f64) -> ScoredDecision {
        ScoredDecision {
            decision_id: id.into(),
            score,
        }
    }

    #[test]
    fn test_l1_round_trip() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        let results = vec![scored("d1", 0.9), scored("d2", 0.7)];
        cache.cache_result("question?", 0.6, 3, results.clone());
        assert_eq!(cache.get_cached_result("question?", 0.6, 3), Some(results));
    }

    #[test]
    fn test_l1_key_includes_threshold_and_limit() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        cache.cache_result("q", 0.6, 3, vec![scored("d1", 0.9)]);
        assert_eq!(cache.get_cached_result("q", 0.7, 3), None);
        assert_eq!(cache.get_cached_result("q", 0.6, 5), None);
    }

    #[test]
    fn test_invalidate_all_queries_leaves_l2() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        cache.cache_result("q", 0.6, 3, vec![scored("d1", 0.9)]);
        cache.cache_embedding("q", vec![0.1, 0.2]);

        cache.invalidate_all_queries();

        assert_eq!(cache.get_cached_result("q", 0.6, 3), None);
        assert_eq!(cache.get_cached_embedding("q"), Some(vec![0.1, 0.2]));
        let stats = cache.stats();
        assert!(stats.last_invalidation.is_some());
        assert_eq!(stats.l2_embedding_cache.size, 1);
    }

    #[test]
    fn test_last_invalidation_is_recent() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        let before = Utc::now();
        cache.invalidate_all_queries();
        let at = cache.stats().last_invalidation.unwrap();
        assert!(at >= before);
        assert!(at <= Utc::now());
    }

    #[test]
    fn test_invalidate_all_clears_both_tiers() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        cache.cache_result("q", 0.6, 3, vec![scored("d1", 0.9)]);
        cache.cache_embedding("q", vec![0.1]);
        cache.invalidate_all();
        assert_eq!(cache.get_cached_result("q", 0.6, 3), None);
        assert_eq!(cache.get_cached_embedding("q"), None);
    }

    #[test]
    fn test_l1_ttl_expiry() {
        let cache = SimilarityCache::new(10, 10, Duration::from_millis(30));
        cache.cache_result("q", 0.6, 3, vec![scored("d1", 0.9)]);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.get_cached_result("q", 0.6, 3), None);
    }

    #[test]
    fn test_combined_stats() {
        let cache = SimilarityCache::new(10, 10, Duration::from_secs(300));
        cache.cache_result("q", 0.6, 3, vec![scored("d1", 0.9)]);
        cache.get_cached_result("q", 0.6, 3); // L1 hit
        cache.get_cached_embedding("q"); // L2 miss

        let stats = cache.stats();
        assert_eq!(stats.l1_query_cache.hits, 1);
        assert_eq!(stats.l2_embedding_cache.misses, 1);
        assert_eq!(stats.combined_hit_rate, 0.5);
        assert_eq!(stats.query_ttl_secs, 300);
    }

    #[test]
    fn test_invalidation_performance_at_capacity() {
        let cache = SimilarityCache::new(100, 100, Duration::from_secs(300));
        for i in 0..100 {
            cache.cache_result(&format!("q{i}"), 0.6, 3, vec![scored("d", 0.5)]);
        }
        let start = Instant::now();
        cache.invalidate_all_queries();
        assert!(
            start.elapsed() < Duration::from_millis(10),
            "invalidation took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn test_get_performance_at_capacity() {
        let cache = SimilarityCache::new(200, 10, Duration::from_secs(300));
        for i in 0..200 {
            cache.cache_result(&format!("q{i}"), 0.6, 3, vec![scored("d", 0.5)]);
        }
        let start = Instant::now();
        for _ in 0..100 {
            cache.get_cached_result("q100", 0.6, 3);
        }
        let per_get = start.elapsed() / 100;
        assert!(per_get < Duration::from_millis(1), "get took {per_get:?}");
    }
}
