// crates/counsel-server/src/deliberation/convergence.rs
// Per-round convergence analysis across consecutive responses

use crate::config::ConvergenceDetectionConfig;
use crate::similarity::SimilarityDetector;
use counsel_types::{ConvergenceInfo, ConvergenceStatus, RoundResponse, RoundScores, VotingResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Tracks similarity between consecutive rounds per participant and
/// derives the convergence status.
///
/// Two counters run independently: `consecutive_stable` counts rounds
/// at or above the convergence threshold, `impasse_rounds` counts
/// rounds of stable-but-below-threshold similarity (stable
/// disagreement).
pub struct ConvergenceDetector {
    config: ConvergenceDetectionConfig,
    detector: Arc<SimilarityDetector>,
    consecutive_stable: u32,
    impasse_rounds: u32,
    prev_min: Option<f64>,
    detected: bool,
    detection_round: Option<u32>,
    scores_by_round: Vec<RoundScores>,
    per_participant: BTreeMap<String, f64>,
}

impl ConvergenceDetector {
    pub fn new(config: ConvergenceDetectionConfig, detector: Arc<SimilarityDetector>) -> Self {
        Self {
            config,
            detector,
            consecutive_stable: 0,
            impasse_rounds: 0,
            prev_min: None,
            detected: false,
            detection_round: None,
            scores_by_round: Vec::new(),
            per_participant: BTreeMap::new(),
        }
    }

    /// Analyze one round against its predecessor.
    ///
    /// Returns None before `min_rounds_before_check` or when no
    /// participant appears in both rounds. The minimum per-participant
    /// similarity drives the status.
    pub async fn check_round(
        &mut self,
        round: u32,
        previous: &[RoundResponse],
        current: &[RoundResponse],
    ) -> Option<ConvergenceStatus> {
        if round < self.config.min_rounds_before_check {
            return None;
        }

        let mut min_sim: Option<f64> = None;
        for response in current {
            let Some(prior) = previous
                .iter()
                .find(|p| p.participant == response.participant)
            else {
                continue;
            };
            let sim = self
                .detector
                .compute(&response.response, &prior.response)
                .await;
            self.per_participant
                .insert(response.participant.clone(), sim);
            min_sim = Some(min_sim.map_or(sim, |m: f64| m.min(sim)));
        }

        let min_sim = min_sim?;
        let status = self.classify(round, min_sim);
        self.scores_by_round.push(RoundScores {
            round,
            min_similarity: min_sim,
            status,
        });
        self.prev_min = Some(min_sim);
        debug!(round, min_sim, ?status, "Convergence check");
        Some(status)
    }

    fn classify(&mut self, round: u32, min_sim: f64) -> ConvergenceStatus {
        let converge_at = self.config.semantic_similarity_threshold;
        let diverge_below = self.config.divergence_threshold;
        // Round-over-round movement below this delta counts as stable
        let stable_delta = 1.0 - self.config.stance_stability_threshold;

        if min_sim >= converge_at {
            self.consecutive_stable += 1;
            self.impasse_rounds = 0;
            if self.consecutive_stable >= self.config.consecutive_stable_rounds {
                if !self.detected {
                    self.detected = true;
                    self.detection_round = Some(round);
                }
                return ConvergenceStatus::Converged;
            }
            return ConvergenceStatus::Refining;
        }

        self.consecutive_stable = 0;

        if min_sim < diverge_below {
            self.impasse_rounds = 0;
            return ConvergenceStatus::Diverging;
        }

        // Between the thresholds: stable disagreement accrues toward
        // impasse, movement resets it.
        let stable = self
            .prev_min
            .map(|prev| (min_sim - prev).abs() <= stable_delta)
            .unwrap_or(false);
        if stable {
            self.impasse_rounds += 1;
        } else {
            self.impasse_rounds = 0;
        }
        if self.impasse_rounds >= self.config.consecutive_stable_rounds {
            ConvergenceStatus::Impasse
        } else {
            ConvergenceStatus::Refining
        }
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    /// Final convergence info for the result.
    ///
    /// `hit_round_limit` marks deliberations that ran out of rounds
    /// without detection.
    pub fn info(&self, hit_round_limit: bool) -> ConvergenceInfo {
        let final_similarity = self
            .scores_by_round
            .last()
            .map(|s| s.min_similarity)
            .unwrap_or(0.0);
        let status = if self.detected {
            ConvergenceStatus::Converged
        } else if let Some(last) = self.scores_by_round.last() {
            if hit_round_limit && last.status == ConvergenceStatus::Refining {
                ConvergenceStatus::MaxRounds
            } else {
                last.status
            }
        } else if hit_round_limit {
            ConvergenceStatus::MaxRounds
        } else {
            ConvergenceStatus::Unknown
        };

        ConvergenceInfo {
            detected: self.detected,
            detection_round: self.detection_round,
            final_similarity,
            status,
            scores_by_round: self.scores_by_round.clone(),
            per_participant_similarity: self.per_participant.clone(),
        }
    }
}

/// Voting-aware status resolution for the final result: voting outcomes
/// override the similarity-derived status.
pub fn resolve_with_voting(
    status: ConvergenceStatus,
    voting: Option<&VotingResult>,
) -> ConvergenceStatus {
    let Some(voting) = voting else {
        return status;
    };
    if voting.votes_by_round.is_empty() {
        return status;
    }

    let unanimous = voting.final_tally.len() == 1;
    if unanimous {
        ConvergenceStatus::UnanimousConsensus
    } else if voting.consensus_reached {
        ConvergenceStatus::MajorityDecision
    } else if voting.winning_option.is_none() {
        ConvergenceStatus::Tie
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use counsel_types::{RoundVote, Vote};

    fn config() -> ConvergenceDetectionConfig {
        ConvergenceDetectionConfig {
            enabled: true,
            semantic_similarity_threshold: 0.85,
            divergence_threshold: 0.40,
            min_rounds_before_check: 2,
            consecutive_stable_rounds: 2,
            stance_stability_threshold: 0.80,
            response_length_drop_threshold: 0.40,
        }
    }

    fn detector() -> ConvergenceDetector {
        ConvergenceDetector::new(config(), Arc::new(SimilarityDetector::new(None)))
    }

    fn responses(round: u32, texts: &[(&str, &str)]) -> Vec<RoundResponse> {
        texts
            .iter()
            .map(|(participant, text)| RoundResponse {
                round,
                participant: participant.to_string(),
                response: text.to_string(),
                timestamp: Utc::now(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_no_check_before_min_rounds() {
        let mut d = detector();
        let r1 = responses(1, &[("p1", "initial position statement")]);
        let r2 = responses(1, &[("p1", "initial position statement")]);
        assert!(d.check_round(1, &r1, &r2).await.is_none());
    }

    #[tokio::test]
    async fn test_min_similarity_across_participants() {
        let mut d = detector();
        let prev = responses(
            1,
            &[
                ("p1", "we should adopt rust for all new services"),
                ("p2", "databases need careful schema design work"),
            ],
        );
        let curr = responses(
            2,
            &[
                ("p1", "we should adopt rust for all new services"),
                ("p2", "completely different topic about frontend colors"),
            ],
        );
        d.check_round(2, &prev, &curr).await.unwrap();

        let info = d.info(false);
        // p1 identical → ~1.0; p2 dissimilar; min tracks p2
        let p1 = info.per_participant_similarity["p1"];
        let p2 = info.per_participant_similarity["p2"];
        assert!(p1 > 0.99);
        assert!(p2 < p1);
        assert!((info.final_similarity - p1.min(p2)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_converged_needs_consecutive_stable_rounds() {
        let mut d = detector();
        let text = "we should adopt rust for all new services";
        let prev = responses(1, &[("p1", text), ("p2", text)]);
        let curr = responses(2, &[("p1", text), ("p2", text)]);

        // First high-similarity round: stable count 1 of 2 → refining
        let status = d.check_round(2, &prev, &curr).await.unwrap();
        assert_eq!(status, ConvergenceStatus::Refining);
        assert!(!d.detected());

        // Second: converged
        let next = responses(3, &[("p1", text), ("p2", text)]);
        let status = d.check_round(3, &curr, &next).await.unwrap();
        assert_eq!(status, ConvergenceStatus::Converged);
        assert!(d.detected());
        assert_eq!(d.info(false).detection_round, Some(3));
    }

    #[tokio::test]
    async fn test_diverging_status() {
        let mut d = detector();
        let prev = responses(1, &[("p1", "alpha beta gamma delta epsilon")]);
        let curr = responses(2, &[("p1", "zeta eta theta iota kappa")]);
        let status = d.check_round(2, &prev, &curr).await.unwrap();
        assert_eq!(status, ConvergenceStatus::Diverging);
    }

    #[tokio::test]
    async fn test_impasse_after_stable_disagreement() {
        let mut d = detector();
        // Mid-band similarity, stable across rounds: shared words keep the
        // pair in the refining band round after round.
        let a = "we should use postgres because relational wins on reliability and tooling";
        let b = "we should use mongo because document flexibility wins on reliability and tooling";

        let r1 = responses(1, &[("p1", a)]);
        let r2 = responses(2, &[("p1", b)]);
        let r3 = responses(3, &[("p1", a)]);
        let r4 = responses(4, &[("p1", b)]);

        let s2 = d.check_round(2, &r1, &r2).await.unwrap();
        assert_eq!(s2, ConvergenceStatus::Refining);
        let s3 = d.check_round(3, &r2, &r3).await.unwrap();
        // Same score band, stable → impasse counter builds
        let s4 = d.check_round(4, &r3, &r4).await.unwrap();
        assert!(
            s3 == ConvergenceStatus::Impasse || s4 == ConvergenceStatus::Impasse,
            "stable disagreement should reach impasse, got {s3:?} then {s4:?}"
        );
    }

    #[tokio::test]
    async fn test_participant_missing_from_previous_round_skipped() {
        let mut d = detector();
        let prev = responses(1, &[("p1", "position one text here")]);
        let curr = responses(
            2,
            &[
                ("p1", "position one text here"),
                ("p2", "newcomer with a fresh position"),
            ],
        );
        d.check_round(2, &prev, &curr).await.unwrap();
        let info = d.info(false);
        assert!(info.per_participant_similarity.contains_key("p1"));
        assert!(!info.per_participant_similarity.contains_key("p2"));
    }

    #[tokio::test]
    async fn test_no_common_participants_returns_none() {
        let mut d = detector();
        let prev = responses(1, &[("p1", "text")]);
        let curr = responses(2, &[("p2", "text")]);
        assert!(d.check_round(2, &prev, &curr).await.is_none());
    }

    #[tokio::test]
    async fn test_info_max_rounds() {
        let mut d = detector();
        let prev = responses(1, &[("p1", "we should use postgres for storage needs")]);
        let curr = responses(2, &[("p1", "we should use postgres for the storage layer")]);
        d.check_round(2, &prev, &curr).await;
        let info = d.info(true);
        assert!(!info.detected);
        assert!(matches!(
            info.status,
            ConvergenceStatus::MaxRounds | ConvergenceStatus::Converged
        ));
    }

    #[tokio::test]
    async fn test_info_unknown_without_checks() {
        let d = detector();
        let info = d.info(false);
        assert_eq!(info.status, ConvergenceStatus::Unknown);
        assert_eq!(info.final_similarity, 0.0);
    }

    // ============================================================================
    // Voting-aware resolution
    // ============================================================================

    fn voting(tally: &[(&str, u32)], consensus: bool, winner: Option<&str>) -> VotingResult {
        let votes_by_round = tally
            .iter()
            .flat_map(|(option, count)| {
                (0..*count).map(move |i| RoundVote {
                    round: 1,
                    participant: format!("p{i}-{option}"),
                    vote: Vote {
                        option: option.to_string(),
                        confidence: 0.9,
                        rationale: "r".into(),
                        continue_debate: false,
                    },
                    timestamp: Utc::now(),
                })
            })
            .collect();
        VotingResult {
            final_tally: tally.iter().map(|(o, c)| (o.to_string(), *c)).collect(),
            votes_by_round,
            consensus_reached: consensus,
            winning_option: winner.map(|s| s.to_string()),
        }
    }

    #[test]
    fn test_unanimous_overrides() {
        let v = voting(&[("A", 4)], true, Some("A"));
        assert_eq!(
            resolve_with_voting(ConvergenceStatus::Refining, Some(&v)),
            ConvergenceStatus::UnanimousConsensus
        );
    }

    #[test]
    fn test_majority_overrides() {
        let v = voting(&[("A", 4), ("B", 2)], true, Some("A"));
        assert_eq!(
            resolve_with_voting(ConvergenceStatus::Converged, Some(&v)),
            ConvergenceStatus::MajorityDecision
        );
    }

    #[test]
    fn test_tie_overrides() {
        let v = voting(&[("A", 2), ("B", 2)], false, None);
        assert_eq!(
            resolve_with_voting(ConvergenceStatus::Refining, Some(&v)),
            ConvergenceStatus::Tie
        );
    }

    #[test]
    fn test_plurality_without_majority_keeps_status() {
        let v = voting(&[("A", 2), ("B", 1), ("C", 1)], false, Some("A"));
        assert_eq!(
            resolve_with_voting(ConvergenceStatus::Refining, Some(&v)),
            ConvergenceStatus::Refining
        );
    }

    #[test]
    fn test_no_voting_keeps_status() {
        assert_eq!(
            resolve_with_voting(ConvergenceStatus::Impasse, None),
            ConvergenceStatus::Impasse
        );
    }
}
