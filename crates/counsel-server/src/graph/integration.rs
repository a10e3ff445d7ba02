// crates/counsel-server/src/graph/integration.rs
// Glue between the deliberation engine and the decision graph:
// tiered context injection and post-deliberation storage

use super::retrieval::DecisionRetriever;
use super::store::GraphStore;
use super::worker::{JobPriority, SimilarityWorker, compute_similarities_inline};
use crate::config::DecisionGraphConfig;
use crate::error::{CounselError, Result};
use crate::similarity::SimilarityDetector;
use chrono::Utc;
use counsel_types::{DecisionNode, DeliberationResult, ParticipantStance};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Seconds between storing a decision and its similarity job landing on
/// the queue (leaves a window for write batching).
const SIMILARITY_ENQUEUE_DELAY_SECS: u64 = 1;

/// Character cap for the stored copy of a participant's final position.
const FINAL_POSITION_MAX_CHARS: usize = 500;

/// Rough token estimate: characters / 4.
fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

fn preamble() -> &'static str {
    "## Relevant Past Deliberations\n\n\
     The counsel has deliberated on related questions before. This \
     historical context is provided for reference:\n"
}

fn postamble() -> &'static str {
    "\nConsider this history where it is relevant, but deliberate the \
     current question on its own merits.\n"
}

/// Integration layer owning context retrieval and storage for the
/// decision graph.
pub struct GraphIntegration {
    store: Arc<GraphStore>,
    retriever: Arc<DecisionRetriever>,
    detector: Arc<SimilarityDetector>,
    worker: Option<Arc<SimilarityWorker>>,
    config: DecisionGraphConfig,
}

impl GraphIntegration {
    pub fn new(
        store: Arc<GraphStore>,
        retriever: Arc<DecisionRetriever>,
        detector: Arc<SimilarityDetector>,
        worker: Option<Arc<SimilarityWorker>>,
        config: DecisionGraphConfig,
    ) -> Self {
        Self {
            store,
            retriever,
            detector,
            worker,
            config,
        }
    }

    // ------------------------------------------------------------------
    // Context retrieval
    // ------------------------------------------------------------------

    /// Build the markdown context block for a new deliberation.
    ///
    /// Retrieved decisions are partitioned into strong / moderate tiers
    /// by the configured boundaries; anything below moderate is
    /// dropped. The formatted block is trimmed from the tail until it
    /// fits the token budget. Returns an empty string when nothing
    /// qualifies.
    pub async fn retrieve_context(&self, question: &str) -> Result<String> {
        let results = self
            .retriever
            .find_relevant(
                question,
                self.config.noise_floor,
                Some(self.config.max_context_decisions),
            )
            .await?;

        let bounds = &self.config.tier_boundaries;
        let mut strong = Vec::new();
        let mut moderate = Vec::new();
        for (node, score) in results {
            if score >= bounds.strong {
                strong.push((node, score));
            } else if score >= bounds.moderate {
                moderate.push((node, score));
            }
        }

        if strong.is_empty() && moderate.is_empty() {
            debug!("No past decisions above the moderate tier boundary");
            return Ok(String::new());
        }

        // Blocks ordered strong-then-moderate, each tier already sorted
        // by score descending; budget trimming pops from the tail so the
        // weakest context goes first.
        let mut blocks: Vec<String> = Vec::new();
        if !strong.is_empty() {
            let mut section = String::from("### Strongly related\n");
            for (node, score) in &strong {
                section.push_str(&format_decision_block(node, *score));
            }
            blocks.push(section);
        }
        for (node, score) in &moderate {
            blocks.push(format!(
                "### Possibly related\n{}",
                format_decision_block(node, *score)
            ));
        }

        let budget = self.config.context_token_budget;
        loop {
            let assembled = format!("{}{}{}", preamble(), blocks.join("\n"), postamble());
            if estimate_tokens(&assembled) <= budget {
                info!(
                    strong = strong.len(),
                    moderate = moderate.len(),
                    tokens = estimate_tokens(&assembled),
                    "Injecting decision graph context"
                );
                return Ok(assembled);
            }
            if blocks.pop().is_none() {
                return Ok(String::new());
            }
            if blocks.is_empty() {
                debug!("Token budget too small for any context block");
                return Ok(String::new());
            }
        }
    }

    // ------------------------------------------------------------------
    // Post-deliberation storage
    // ------------------------------------------------------------------

    /// Persist a completed deliberation and schedule similarity edges.
    ///
    /// Returns promptly: the node and its stances are written in one
    /// transaction, the L1 cache is event-invalidated, and the edge
    /// computation is queued at low priority. When the worker is
    /// unavailable or its queue is full, edges are computed inline.
    pub async fn store_deliberation(
        &self,
        question: &str,
        result: &DeliberationResult,
    ) -> Result<String> {
        let node = build_decision_node(question, result);
        let decision_id = node.id.clone();
        let stances = build_stances(&decision_id, result);

        if stances.is_empty() {
            return Err(CounselError::Store(
                "refusing to store a deliberation with no participant stances".into(),
            ));
        }

        self.store
            .save_decision_with_stances(node, stances)
            .await?;

        // New decision lands: cached query results are stale.
        self.retriever.invalidate_queries();

        if self.config.compute_similarities {
            self.schedule_similarities(&decision_id).await;
        }

        info!(decision_id = %decision_id, "Stored deliberation in decision graph");
        Ok(decision_id)
    }

    async fn schedule_similarities(&self, decision_id: &str) {
        if let Some(worker) = &self.worker {
            match worker.enqueue(decision_id, JobPriority::Low, SIMILARITY_ENQUEUE_DELAY_SECS) {
                Ok(()) => return,
                Err(CounselError::QueueFull) => {
                    warn!(decision_id, "Similarity queue full, computing inline");
                }
                Err(e) => {
                    warn!(decision_id, "Similarity worker unavailable ({e}), computing inline");
                }
            }
        }
        if let Err(e) = compute_similarities_inline(
            &self.store,
            &self.detector,
            decision_id,
            50,
            0.5,
        )
        .await
        {
            warn!(decision_id, "Inline similarity computation failed: {e}");
        }
    }

    pub fn retriever(&self) -> &Arc<DecisionRetriever> {
        &self.retriever
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }
}

fn format_decision_block(node: &DecisionNode, score: f64) -> String {
    let mut block = format!(
        "\n**Q: {}** (similarity {:.0}%)\n- Consensus: {}\n",
        node.question,
        score * 100.0,
        node.consensus
    );
    if let Some(option) = &node.winning_option {
        block.push_str(&format!("- Winning option: {option}\n"));
    }
    block.push_str(&format!(
        "- Participants: {} | Date: {}\n",
        node.participants.len(),
        node.timestamp.format("%Y-%m-%d")
    ));
    block
}

fn build_decision_node(question: &str, result: &DeliberationResult) -> DecisionNode {
    let winning_option = result
        .voting_result
        .as_ref()
        .and_then(|v| v.winning_option.clone());
    let convergence_status = result
        .convergence_info
        .as_ref()
        .map(|c| c.status.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let mut metadata = serde_json::Map::new();
    metadata.insert("mode".into(), result.mode.clone().into());
    metadata.insert("rounds_completed".into(), result.rounds_completed.into());

    DecisionNode {
        id: DecisionNode::new_id(),
        question: question.to_string(),
        timestamp: Utc::now(),
        consensus: result.summary.consensus.clone(),
        winning_option,
        convergence_status,
        participants: result.participants.clone(),
        transcript_path: result.transcript_path.clone(),
        metadata,
    }
}

fn build_stances(decision_id: &str, result: &DeliberationResult) -> Vec<ParticipantStance> {
    result
        .participants
        .iter()
        .map(|participant| {
            // Last vote this participant cast across the whole debate
            let last_vote = result.voting_result.as_ref().and_then(|voting| {
                voting
                    .votes_by_round
                    .iter()
                    .filter(|v| &v.participant == participant)
                    .max_by_key(|v| v.round)
            });

            // Last-round response, truncated
            let final_position = result
                .full_debate
                .iter()
                .filter(|r| &r.participant == participant)
                .max_by_key(|r| r.round)
                .map(|r| truncate_chars(&r.response, FINAL_POSITION_MAX_CHARS))
                .unwrap_or_default();

            ParticipantStance {
                decision_id: decision_id.to_string(),
                participant: participant.clone(),
                vote_option: last_vote.map(|v| v.vote.option.clone()),
                confidence: last_vote.map(|v| v.vote.confidence.clamp(0.0, 1.0)),
                rationale: last_vote.map(|v| v.vote.rationale.clone()),
                final_position,
            }
        })
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}
