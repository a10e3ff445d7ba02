// crates/counsel-server/src/graph/query.rs
// Unified query interface over the decision graph

use super::store::GraphStore;
use crate::error::Result;
use crate::similarity::SimilarityDetector;
use counsel_types::{DecisionNode, ParticipantStance};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Result from similar-decision search.
#[derive(Debug, Clone, Serialize)]
pub struct SimilarResult {
    pub decision: DecisionNode,
    pub score: f64,
}

/// Detected contradiction between two decisions: similar questions that
/// reached different outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct Contradiction {
    pub decision_id_1: String,
    pub decision_id_2: String,
    pub question_1: String,
    pub question_2: String,
    pub conflict_type: String,
    pub severity: f64,
    pub description: String,
}

/// A decision plus its per-participant stances.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionDetail {
    pub decision: DecisionNode,
    pub stances: Vec<ParticipantStance>,
}

/// Query engine over the decision graph, shared by the MCP tool surface
/// and the CLI inspection commands.
pub struct QueryEngine {
    store: Arc<GraphStore>,
    detector: Arc<SimilarityDetector>,
    default_threshold: f64,
}

impl QueryEngine {
    pub fn new(store: Arc<GraphStore>, detector: Arc<SimilarityDetector>, noise_floor: f64) -> Self {
        Self {
            store,
            detector,
            default_threshold: noise_floor,
        }
    }

    /// Find past deliberations semantically similar to the query.
    pub async fn search_similar(
        &self,
        query: &str,
        limit: usize,
        threshold: Option<f64>,
    ) -> Result<Vec<SimilarResult>> {
        let threshold = threshold.unwrap_or(self.default_threshold);
        let decisions = self.store.list_decisions(usize::MAX >> 1, 0).await?;

        let mut results = Vec::new();
        for decision in decisions {
            let score = self.detector.compute(query, &decision.question).await;
            if score >= threshold {
                results.push(SimilarResult { decision, score });
            }
        }
        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(limit);
        debug!(count = results.len(), threshold, "search_similar complete");
        Ok(results)
    }

    /// Identify pairs of similar questions whose outcomes conflict
    /// (different winning options or convergence statuses).
    pub async fn find_contradictions(&self, threshold: f64) -> Result<Vec<Contradiction>> {
        let decisions = self.store.list_decisions(usize::MAX >> 1, 0).await?;
        let mut contradictions = Vec::new();

        for (i, first) in decisions.iter().enumerate() {
            for second in &decisions[i + 1..] {
                let similarity = self
                    .detector
                    .compute(&first.question, &second.question)
                    .await;
                if similarity < threshold {
                    continue;
                }
                if !outcomes_differ(first, second) {
                    continue;
                }
                contradictions.push(Contradiction {
                    decision_id_1: first.id.clone(),
                    decision_id_2: second.id.clone(),
                    question_1: first.question.clone(),
                    question_2: second.question.clone(),
                    conflict_type: "conflicting_consensus".into(),
                    severity: similarity,
                    description: format!(
                        "Different consensus on similar topic: '{}' vs '{}'",
                        first.consensus, second.consensus
                    ),
                });
            }
        }
        debug!(count = contradictions.len(), "find_contradictions complete");
        Ok(contradictions)
    }

    /// Load one decision with its stances.
    pub async fn get_decision_detail(&self, decision_id: &str) -> Result<Option<DecisionDetail>> {
        let Some(decision) = self.store.get_decision(decision_id).await? else {
            return Ok(None);
        };
        let stances = self.store.get_stances(decision_id).await?;
        Ok(Some(DecisionDetail { decision, stances }))
    }
}

/// Two similar questions contradict when their winning options differ
/// or their convergence statuses differ.
fn outcomes_differ(a: &DecisionNode, b: &DecisionNode) -> bool {
    if let (Some(wa), Some(wb)) = (&a.winning_option, &b.winning_option) {
        if wa != wb {
            return true;
        }
    }
    a.convergence_status != b.convergence_status
}
