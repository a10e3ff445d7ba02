// crates/counsel-types/src/lib.rs

//! Shared data contracts between the Counsel server and its clients.
//!
//! This crate provides the core domain model for:
//! - **Deliberation**: requests, per-round responses, votes, summaries
//! - **Decision graph**: persisted decisions, stances, similarity edges
//!
//! These types carry no runtime dependencies beyond serde; everything
//! that touches sockets, subprocesses, or SQLite lives in the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ===================================================
// DELIBERATION REQUESTS
// ===================================================

/// One (adapter, model) pair contributing a response per round.
///
/// Identity in logs and storage is the composite `"{model}@{adapter}"`.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Participant {
    /// Adapter name drawn from the registered adapter set
    /// (e.g. "claude", "ollama", "openrouter").
    pub adapter: String,
    /// Model identifier interpreted by the adapter. When omitted, the
    /// server substitutes the registry default for the adapter.
    pub model: Option<String>,
}

impl Participant {
    /// Composite identity used in transcripts, logs, and storage.
    pub fn identity(&self) -> String {
        format!("{}@{}", self.model.as_deref().unwrap_or("default"), self.adapter)
    }
}

/// Deliberation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliberationMode {
    /// Single round regardless of the requested round count.
    Quick,
    /// Full multi-round debate.
    Conference,
}

impl std::fmt::Display for DeliberationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quick => write!(f, "quick"),
            Self::Conference => write!(f, "conference"),
        }
    }
}

/// Minimum question length accepted by [`DeliberateRequest::validate`].
pub const MIN_QUESTION_CHARS: usize = 10;
/// Round count bounds accepted by [`DeliberateRequest::validate`].
pub const MAX_ROUNDS: u32 = 5;

/// A request to run one multi-round, multi-participant deliberation.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DeliberateRequest {
    /// The question or proposal to deliberate on (at least 10 chars).
    pub question: String,
    /// Participants (minimum 2).
    pub participants: Vec<Participant>,
    /// Number of deliberation rounds (1-5).
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    #[serde(default = "default_mode")]
    pub mode: DeliberationMode,
    /// Optional caller-provided context prepended to round 1.
    #[serde(default)]
    pub context: Option<String>,
    /// Working directory for evidence-gathering tools. Required.
    pub working_directory: String,
}

fn default_rounds() -> u32 {
    2
}

fn default_mode() -> DeliberationMode {
    DeliberationMode::Conference
}

impl DeliberateRequest {
    /// Validate request shape before any work is done.
    pub fn validate(&self) -> Result<(), String> {
        if self.question.chars().count() < MIN_QUESTION_CHARS {
            return Err(format!(
                "question must be at least {MIN_QUESTION_CHARS} characters"
            ));
        }
        if self.participants.len() < 2 {
            return Err("at least 2 participants are required".into());
        }
        if self.rounds < 1 || self.rounds > MAX_ROUNDS {
            return Err(format!("rounds must be between 1 and {MAX_ROUNDS}"));
        }
        if self.working_directory.trim().is_empty() {
            return Err("working_directory is required".into());
        }
        Ok(())
    }
}

// ===================================================
// ROUND RESPONSES & VOTING
// ===================================================

/// A single participant's response in one round. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponse {
    /// Round number (1-based).
    pub round: u32,
    /// Composite participant identity ("{model}@{adapter}").
    pub participant: String,
    pub response: String,
    /// ISO 8601 timestamp.
    pub timestamp: DateTime<Utc>,
}

/// A structured vote embedded in an otherwise free-form response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// The voting option (e.g. "Option A", "Yes", "Approve").
    pub option: String,
    /// Confidence in [0, 1]; clamped at parse time.
    pub confidence: f64,
    pub rationale: String,
    /// Whether this participant wants to keep debating.
    #[serde(default = "default_continue")]
    pub continue_debate: bool,
}

fn default_continue() -> bool {
    true
}

/// A vote cast by a specific participant in a specific round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundVote {
    pub round: u32,
    pub participant: String,
    pub vote: Vote,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated voting results across all rounds of a deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingResult {
    /// Vote counts by option, across every (round, participant) vote.
    pub final_tally: std::collections::BTreeMap<String, u32>,
    pub votes_by_round: Vec<RoundVote>,
    /// True iff a single option received more than half of all votes cast.
    pub consensus_reached: bool,
    /// Unique plurality option; None on a tie.
    pub winning_option: Option<String>,
}

// ===================================================
// CONVERGENCE
// ===================================================

/// Convergence status across deliberation rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergenceStatus {
    Converged,
    Diverging,
    Refining,
    Impasse,
    MaxRounds,
    UnanimousConsensus,
    MajorityDecision,
    Tie,
    Unknown,
}

impl std::fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Converged => "converged",
            Self::Diverging => "diverging",
            Self::Refining => "refining",
            Self::Impasse => "impasse",
            Self::MaxRounds => "max_rounds",
            Self::UnanimousConsensus => "unanimous_consensus",
            Self::MajorityDecision => "majority_decision",
            Self::Tie => "tie",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

impl ConvergenceStatus {
    /// Parse a stored status string back into the enum (Unknown on mismatch).
    pub fn parse(s: &str) -> Self {
        match s {
            "converged" => Self::Converged,
            "diverging" => Self::Diverging,
            "refining" => Self::Refining,
            "impasse" => Self::Impasse,
            "max_rounds" => Self::MaxRounds,
            "unanimous_consensus" => Self::UnanimousConsensus,
            "majority_decision" => Self::MajorityDecision,
            "tie" => Self::Tie,
            _ => Self::Unknown,
        }
    }
}

/// Similarity scores recorded for one convergence check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundScores {
    pub round: u32,
    /// Minimum similarity across participants present in both rounds.
    pub min_similarity: f64,
    pub status: ConvergenceStatus,
}

/// Convergence detection metadata attached to a deliberation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergenceInfo {
    /// Whether convergence was detected before the round limit.
    pub detected: bool,
    /// Round where convergence occurred (None if never detected).
    pub detection_round: Option<u32>,
    /// Final minimum similarity across all participants (0.0-1.0).
    pub final_similarity: f64,
    pub status: ConvergenceStatus,
    /// Historical scores for each checked round.
    pub scores_by_round: Vec<RoundScores>,
    /// Latest similarity per participant identity.
    pub per_participant_similarity: std::collections::BTreeMap<String, f64>,
}

// ===================================================
// SUMMARY & RESULT
// ===================================================

/// Structured summary produced by the summarizing invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub consensus: String,
    pub key_agreements: Vec<String>,
    pub key_disagreements: Vec<String>,
    pub final_recommendation: String,
}

/// Overall status of a deliberation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliberationStatus {
    /// At least one round completed and the loop finished normally.
    Complete,
    /// Some but not all requested rounds completed due to a fatal error.
    Partial,
    /// No rounds produced.
    Failed,
}

/// One tool execution performed on behalf of a participant mid-debate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecution {
    pub round: u32,
    /// Participant identity that requested the tool.
    pub requested_by: String,
    pub tool: String,
    pub arguments: serde_json::Value,
    /// Tool output, or an error description when `is_error` is set.
    pub output: String,
    pub is_error: bool,
}

/// Complete result of one deliberation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliberationResult {
    pub status: DeliberationStatus,
    pub mode: String,
    pub rounds_completed: u32,
    /// Composite participant identities.
    pub participants: Vec<String>,
    pub summary: Summary,
    /// One entry per (round, participant), including error sentinels.
    pub full_debate: Vec<RoundResponse>,
    /// None when convergence detection is disabled.
    pub convergence_info: Option<ConvergenceInfo>,
    /// None when no participant cast a vote.
    pub voting_result: Option<VotingResult>,
    /// Historical context injected from the decision graph (None when
    /// the graph is disabled or nothing relevant was found).
    pub graph_context_summary: Option<String>,
    #[serde(default)]
    pub tool_executions: Vec<ToolExecution>,
    pub transcript_path: String,
}

// ===================================================
// DECISION GRAPH ENTITIES
// ===================================================

/// A completed deliberation persisted in the decision graph.
/// Immutable after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionNode {
    /// Unique decision identifier (UUID).
    pub id: String,
    pub question: String,
    pub timestamp: DateTime<Utc>,
    /// Consensus text taken from the summary.
    pub consensus: String,
    pub winning_option: Option<String>,
    pub convergence_status: String,
    /// Composite participant identities.
    pub participants: Vec<String>,
    pub transcript_path: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DecisionNode {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// How one participant positioned itself in a persisted deliberation.
/// One row per (decision, participant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantStance {
    pub decision_id: String,
    pub participant: String,
    /// Last vote cast across the debate, if any.
    pub vote_option: Option<String>,
    /// Clamped to [0, 1] at the store boundary.
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    /// Truncated copy of the participant's last-round response.
    pub final_position: String,
}

/// Directed similarity edge between two decisions. (source, target) is
/// the primary key; both directions are materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionSimilarity {
    pub source_id: String,
    pub target_id: String,
    /// Clamped to [0, 1] before insert.
    pub similarity_score: f64,
    pub computed_at: DateTime<Utc>,
}
