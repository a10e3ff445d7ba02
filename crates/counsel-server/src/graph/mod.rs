// crates/counsel-server/src/graph/mod.rs
// Decision graph memory: store, cache, retrieval, background worker

pub mod cache;
pub mod integration;
pub mod query;
pub mod retrieval;
pub mod schema;
pub mod store;
pub mod worker;

pub use cache::{CacheStats, EMBEDDING_VERSION, LruCache, ScoredDecision, SimilarityCache};
pub use integration::GraphIntegration;
pub use query::{Contradiction, DecisionDetail, QueryEngine, SimilarResult};
pub use retrieval::DecisionRetriever;
pub use store::GraphStore;
pub use worker::{JobPriority, SimilarityJob, SimilarityWorker, WorkerStats};
