// crates/counsel-server/src/deliberation/transcript.rs
// Markdown transcript writer: one file per deliberation

use crate::error::{CounselError, Result};
use chrono::Utc;
use counsel_types::{DeliberationResult, RoundResponse};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Maximum slug length derived from the question.
const SLUG_MAX_CHARS: usize = 60;

/// Writes deliberation transcripts as markdown files named
/// `{UTC timestamp}_{slug}.md`.
pub struct TranscriptWriter {
    output_dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Render and write the transcript; returns the file path.
    pub fn write(&self, question: &str, result: &DeliberationResult) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            CounselError::Store(format!(
                "failed to create transcripts dir {}: {e}",
                self.output_dir.display()
            ))
        })?;

        let filename = format!(
            "{}_{}.md",
            Utc::now().format("%Y%m%d_%H%M%S"),
            slugify(question)
        );
        let path = self.output_dir.join(filename);
        std::fs::write(&path, render_transcript(question, result))?;
        info!(path = %path.display(), "Wrote deliberation transcript");
        Ok(path)
    }
}

/// Lowercase the question and collapse non-alphanumerics to dashes.
pub fn slugify(question: &str) -> String {
    let mut slug = String::new();
    let mut last_dash = true;
    for c in question.chars().flat_map(|c| c.to_lowercase()) {
        if c.is_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
        if slug.chars().count() >= SLUG_MAX_CHARS {
            break;
        }
    }
    slug.trim_matches('-').to_string()
}

fn render_transcript(question: &str, result: &DeliberationResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Deliberation: {question}\n\n"));
    out.push_str(&format!(
        "- **Mode**: {}\n- **Rounds completed**: {}\n- **Status**: {:?}\n- **Participants**: {}\n\n",
        result.mode,
        result.rounds_completed,
        result.status,
        result.participants.join(", ")
    ));

    // Rounds
    let mut rounds: BTreeMap<u32, Vec<&RoundResponse>> = BTreeMap::new();
    for response in &result.full_debate {
        rounds.entry(response.round).or_default().push(response);
    }
    for (round, entries) in &rounds {
        out.push_str(&format!("## Round {round}\n\n"));
        for entry in entries {
            out.push_str(&format!("### {}\n\n{}\n\n", entry.participant, entry.response));
        }
    }

    // Voting results appear only when votes were cast
    if let Some(voting) = &result.voting_result {
        out.push_str("## Voting Results\n\n");
        out.push_str("### Final Tally\n\n");
        for (option, count) in &voting.final_tally {
            out.push_str(&format!("- **{option}**: {count}\n"));
        }
        out.push_str(&format!(
            "\n- Consensus reached: {}\n- Winning option: {}\n\n",
            if voting.consensus_reached { "yes" } else { "no" },
            voting.winning_option.as_deref().unwrap_or("none (tie)")
        ));
        out.push_str("### Votes by Round\n\n");
        for vote in &voting.votes_by_round {
            out.push_str(&format!(
                "- Round {}, {}: {} (confidence {:.2}) — {}\n",
                vote.round,
                vote.participant,
                vote.vote.option,
                vote.vote.confidence,
                vote.vote.rationale
            ));
        }
        out.push('\n');
    }

    if let Some(convergence) = &result.convergence_info {
        out.push_str("## Convergence\n\n");
        out.push_str(&format!(
            "- Status: {}\n- Final similarity: {:.2}\n",
            convergence.status, convergence.final_similarity
        ));
        if let Some(round) = convergence.detection_round {
            out.push_str(&format!("- Detected in round: {round}\n"));
        }
        out.push('\n');
    }

    if !result.tool_executions.is_empty() {
        out.push_str("## Tool Executions\n\n");
        for exec in &result.tool_executions {
            out.push_str(&format!(
                "- Round {}, {} ran `{}`{}\n",
                exec.round,
                exec.requested_by,
                exec.tool,
                if exec.is_error { " (error)" } else { "" }
            ));
        }
        out.push('\n');
    }

    out.push_str("## Summary\n\n");
    out.push_str(&format!("**Consensus**: {}\n\n", result.summary.consensus));
    out.push_str("**Key agreements**:\n");
    for item in &result.summary.key_agreements {
        out.push_str(&format!("- {item}\n"));
    }
    out.push_str("\n**Key disagreements**:\n");
    for item in &result.summary.key_disagreements {
        out.push_str(&format!("- {item}\n"));
    }
    out.push_str(&format!(
        "\n**Final recommendation**: {}\n",
        result.summary.final_recommendation
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use counsel_types::{DeliberationStatus, RoundVote, Summary, Vote, VotingResult};

    fn base_result() -> DeliberationResult {
        DeliberationResult {
            status: DeliberationStatus::Complete,
            mode: "conference".into(),
            rounds_completed: 1,
            participants: vec!["sonnet@claude".into()],
            summary: Summary {
                consensus: "Agreed".into(),
                key_agreements: vec!["Point one".into()],
                key_disagreements: vec![],
                final_recommendation: "Do it".into(),
            },
            full_debate: vec![RoundResponse {
                round: 1,
                participant: "sonnet@claude".into(),
                response: "My position".into(),
                timestamp: Utc::now(),
            }],
            convergence_info: None,
            voting_result: None,
            graph_context_summary: None,
            tool_executions: vec![],
            transcript_path: String::new(),
        }
    }

    #[test]
    fn test_slugify() {
        assert_eq!(
            slugify("Should we use Python for backend?"),
            "should-we-use-python-for-backend"
        );
        assert_eq!(slugify("What?!  Really??"), "what-really");
    }

    #[test]
    fn test_slugify_truncates() {
        let long = "word ".repeat(40);
        assert!(slugify(&long).chars().count() <= SLUG_MAX_CHARS);
    }

    #[test]
    fn test_write_creates_file_with_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path());
        let path = writer.write("Should we use Python?", &base_result()).unwrap();

        assert!(path.exists());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("# Deliberation: Should we use Python?"));
        assert!(content.contains("## Round 1"));
        assert!(content.contains("My position"));
        assert!(content.contains("**Consensus**: Agreed"));
    }

    #[test]
    fn test_no_voting_section_without_votes() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path());
        let path = writer.write("No votes question?", &base_result()).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("Voting Results"));
    }

    #[test]
    fn test_voting_section_with_tally() {
        let mut result = base_result();
        result.voting_result = Some(VotingResult {
            final_tally: [("Option A".to_string(), 4u32)].into_iter().collect(),
            votes_by_round: vec![RoundVote {
                round: 1,
                participant: "sonnet@claude".into(),
                vote: Vote {
                    option: "Option A".into(),
                    confidence: 0.9,
                    rationale: "solid".into(),
                    continue_debate: false,
                },
                timestamp: Utc::now(),
            }],
            consensus_reached: true,
            winning_option: Some("Option A".into()),
        });

        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path());
        let path = writer.write("Voted question?", &result).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("## Voting Results"));
        assert!(content.contains("**Option A**: 4"));
        assert!(content.contains("Consensus reached: yes"));
    }

    #[test]
    fn test_filename_shape() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(dir.path());
        let path = writer.write("Filename shape question?", &base_result()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("_filename-shape-question.md"));
        // Leading UTC timestamp: YYYYMMDD_HHMMSS
        assert_eq!(name.chars().take(8).filter(|c| c.is_ascii_digit()).count(), 8);
    }
}
