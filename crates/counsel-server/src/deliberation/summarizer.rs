// crates/counsel-server/src/deliberation/summarizer.rs
// Structured summary generation from the full debate

use crate::adapters::{Adapter, InvokeRequest};
use counsel_types::{RoundResponse, Summary};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Generates the structured summary by invoking a designated adapter
/// once over the whole debate and parsing canonical section headers
/// out of the reply.
pub struct Summarizer {
    adapter: Arc<dyn Adapter>,
    model: String,
}

impl Summarizer {
    pub fn new(adapter: Arc<dyn Adapter>, model: String) -> Self {
        Self { adapter, model }
    }

    /// Produce a summary; on adapter failure a placeholder summary is
    /// returned and the deliberation still completes.
    pub async fn generate(&self, question: &str, responses: &[RoundResponse]) -> Summary {
        let debate_text = format_debate(question, responses);
        let prompt = build_summary_prompt(&debate_text);

        let req = InvokeRequest {
            prompt: &prompt,
            model: &self.model,
            context: None,
            is_deliberation: false,
            working_directory: None,
        };
        match self.adapter.invoke(req).await {
            Ok(text) => parse_summary(&text),
            Err(e) => {
                error!("Summary generation failed: {e}");
                Summary {
                    consensus: "[Summary generation failed]".into(),
                    key_agreements: vec!["Error occurred during summary generation".into()],
                    key_disagreements: vec![],
                    final_recommendation: "Please review the full debate transcript.".into(),
                }
            }
        }
    }
}

/// Group responses by round and render the debate as plain text.
pub fn format_debate(question: &str, responses: &[RoundResponse]) -> String {
    let mut rounds: BTreeMap<u32, Vec<&RoundResponse>> = BTreeMap::new();
    for response in responses {
        rounds.entry(response.round).or_default().push(response);
    }

    let mut lines = vec![format!("Question: {question}\n")];
    for (round, entries) in rounds {
        lines.push(format!("\n--- Round {round} ---"));
        for entry in entries {
            lines.push(format!("\n{}:", entry.participant));
            lines.push(entry.response.clone());
        }
    }
    lines.join("\n")
}

fn build_summary_prompt(debate_text: &str) -> String {
    format!(
        "Analyze the following AI deliberation and provide a structured summary.\n\n\
         {debate_text}\n\n\
         Please provide your analysis in the following format:\n\n\
         CONSENSUS:\n\
         [A 1-2 sentence statement of the overall consensus, if one was reached.\n\
         If no consensus, state \"No clear consensus reached\" and briefly explain the divide.]\n\n\
         KEY AGREEMENTS:\n\
         - [Agreement 1]\n\
         - [Agreement 2]\n\n\
         KEY DISAGREEMENTS:\n\
         - [Disagreement 1]\n\
         [or state \"None\" if all agreed]\n\n\
         FINAL RECOMMENDATION:\n\
         [1-3 sentences providing the best path forward based on the deliberation]\n\n\
         Be concise and focus on the substance of the arguments."
    )
}

/// Parse the canonical section headers out of a summary reply.
pub fn parse_summary(text: &str) -> Summary {
    #[derive(PartialEq, Clone, Copy)]
    enum Section {
        Consensus,
        Agreements,
        Disagreements,
        Recommendation,
    }

    let mut sections: BTreeMap<u8, Vec<String>> = BTreeMap::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        let upper = line.trim().to_uppercase();
        let (next, after_header) = if upper.starts_with("CONSENSUS:") {
            (Some(Section::Consensus), text_after_colon(line))
        } else if upper.contains("KEY AGREEMENT") {
            (Some(Section::Agreements), None)
        } else if upper.contains("KEY DISAGREEMENT") {
            (Some(Section::Disagreements), None)
        } else if upper.contains("FINAL RECOMMENDATION") || upper.starts_with("RECOMMENDATION:") {
            (Some(Section::Recommendation), text_after_colon(line))
        } else {
            (None, None)
        };

        match next {
            Some(section) => {
                current = Some(section);
                if let Some(text) = after_header {
                    sections.entry(section as u8).or_default().push(text);
                }
            }
            None => {
                if let Some(section) = current {
                    sections.entry(section as u8).or_default().push(line.to_string());
                }
            }
        }
    }

    let joined = |s: Section| {
        sections
            .get(&(s as u8))
            .map(|lines| lines.join("\n").trim().to_string())
            .filter(|t| !t.is_empty())
    };

    let agreements = joined(Section::Agreements)
        .map(|t| extract_bullet_points(&t))
        .unwrap_or_default();
    let disagreements = joined(Section::Disagreements)
        .map(|t| extract_bullet_points(&t))
        .unwrap_or_default();

    Summary {
        consensus: joined(Section::Consensus)
            .unwrap_or_else(|| "No consensus information provided".into()),
        key_agreements: if agreements.is_empty() {
            vec!["No specific agreements identified".into()]
        } else {
            agreements
        },
        key_disagreements: if disagreements.is_empty() {
            vec!["No significant disagreements".into()]
        } else {
            disagreements
        },
        final_recommendation: joined(Section::Recommendation)
            .unwrap_or_else(|| "No recommendation provided".into()),
    }
}

/// Extract bullet points, supporting `-`, `*`, `•`, and `1.` / `1)`.
fn extract_bullet_points(text: &str) -> Vec<String> {
    let mut points = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let content = if let Some(rest) = line
            .strip_prefix('-')
            .or_else(|| line.strip_prefix('*'))
            .or_else(|| line.strip_prefix('•'))
        {
            rest.trim()
        } else if line.len() > 2
            && line.chars().next().map(|c| c.is_ascii_digit()).unwrap_or(false)
            && matches!(line.chars().nth(1), Some('.') | Some(')'))
        {
            line[2..].trim()
        } else {
            continue;
        };
        if !content.is_empty() {
            points.push(content.to_string());
        }
    }
    points
}

fn text_after_colon(line: &str) -> Option<String> {
    line.split_once(':')
        .map(|(_, rest)| rest.trim().to_string())
        .filter(|t| !t.is_empty())
}
