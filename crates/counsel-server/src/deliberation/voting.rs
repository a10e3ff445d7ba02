// crates/counsel-server/src/deliberation/voting.rs
// Structured vote extraction and cross-round aggregation

use crate::config::EarlyStoppingConfig;
use chrono::Utc;
use counsel_types::{RoundVote, Vote, VotingResult};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Marker preceding the JSON vote object in a response.
pub const VOTE_MARKER: &str = "VOTE:";

/// Extract a structured vote from a free-form response.
///
/// Scans for a line carrying the vote marker followed by a JSON object
/// with `option`, `confidence`, and `rationale` (`continue_debate`
/// defaults to true). Parse failures yield no vote; confidence is
/// clamped to [0, 1].
pub fn parse_vote(response: &str) -> Option<Vote> {
    for line in response.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(VOTE_MARKER) else {
            continue;
        };
        match serde_json::from_str::<Vote>(rest.trim()) {
            Ok(mut vote) => {
                vote.confidence = vote.confidence.clamp(0.0, 1.0);
                return Some(vote);
            }
            Err(e) => {
                warn!("Unparseable vote line ignored: {e}");
            }
        }
    }
    None
}

/// Accumulates votes across rounds and derives the voting result.
#[derive(Default)]
pub struct VoteTracker {
    votes: Vec<RoundVote>,
}

impl VoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a participant's vote for a round. At most one vote per
    /// (round, participant); later duplicates are ignored.
    pub fn record(&mut self, round: u32, participant: &str, vote: Vote) {
        if self
            .votes
            .iter()
            .any(|v| v.round == round && v.participant == participant)
        {
            warn!(round, participant, "Duplicate vote ignored");
            return;
        }
        debug!(round, participant, option = %vote.option, "Recorded vote");
        self.votes.push(RoundVote {
            round,
            participant: participant.to_string(),
            vote,
            timestamp: Utc::now(),
        });
    }

    /// Parse a response and record its vote if present. Returns whether
    /// a vote was recorded.
    pub fn record_response(&mut self, round: u32, participant: &str, response: &str) -> bool {
        match parse_vote(response) {
            Some(vote) => {
                self.record(round, participant, vote);
                true
            }
            None => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    /// Votes cast in the given round.
    pub fn votes_in_round(&self, round: u32) -> impl Iterator<Item = &RoundVote> {
        self.votes.iter().filter(move |v| v.round == round)
    }

    /// Aggregate into the final voting result; None when nobody voted.
    ///
    /// Consensus requires a single option with a strict majority of all
    /// votes cast; a unique plurality still names a winner, a tie
    /// leaves it empty.
    pub fn result(&self) -> Option<VotingResult> {
        if self.votes.is_empty() {
            return None;
        }

        let mut tally: BTreeMap<String, u32> = BTreeMap::new();
        for v in &self.votes {
            *tally.entry(v.vote.option.clone()).or_insert(0) += 1;
        }

        let total: u32 = tally.values().sum();
        let max_count = tally.values().copied().max().unwrap_or(0);
        let leaders: Vec<&String> = tally
            .iter()
            .filter(|(_, count)| **count == max_count)
            .map(|(option, _)| option)
            .collect();

        let winning_option = if leaders.len() == 1 {
            Some(leaders[0].clone())
        } else {
            None
        };
        let consensus_reached =
            winning_option.is_some() && max_count as f64 > total as f64 / 2.0;

        Some(VotingResult {
            final_tally: tally,
            votes_by_round: self.votes.clone(),
            consensus_reached,
            winning_option,
        })
    }

    /// Model-controlled early stopping after a round.
    ///
    /// The fraction of this round's *participants* whose latest vote
    /// set `continue_debate = false` must reach the threshold;
    /// abstentions count as wanting to continue.
    pub fn should_stop_early(
        &self,
        round: u32,
        participant_count: usize,
        config: &EarlyStoppingConfig,
    ) -> bool {
        if !config.enabled || participant_count == 0 {
            return false;
        }
        let want_stop = self
            .votes_in_round(round)
            .filter(|v| !v.vote.continue_debate)
            .count();
        let fraction = want_stop as f64 / participant_count as f64;
        let stop = fraction >= config.threshold;
        if stop {
            debug!(round, want_stop, participant_count, "Early stopping threshold reached");
        }
        stop
    }
}
