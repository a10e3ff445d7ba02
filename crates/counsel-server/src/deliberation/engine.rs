// crates/counsel-server/src/deliberation/engine.rs
// Round orchestrator: fans the question out to all participants,
// collects responses with per-participant isolation, and decides when
// the debate is done.

use super::convergence::{ConvergenceDetector, resolve_with_voting};
use super::summarizer::{Summarizer, format_debate};
use super::tools::{ToolExecutor, format_tool_context, parse_tool_requests};
use super::transcript::TranscriptWriter;
use super::voting::VoteTracker;
use crate::adapters::{Adapter, InvokeRequest};
use crate::config::{CounselConfig, ModelRegistry};
use crate::error::{CounselError, Result};
use crate::graph::GraphIntegration;
use crate::similarity::SimilarityDetector;
use chrono::Utc;
use counsel_types::{
    ConvergenceStatus, DeliberateRequest, DeliberationMode, DeliberationResult,
    DeliberationStatus, RoundResponse, Summary, ToolExecution,
};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

struct ResolvedParticipant {
    identity: String,
    adapter: Arc<dyn Adapter>,
    model: String,
}

/// Why the round loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    RoundLimit,
    Converged,
    EarlyVote,
}

/// Top-level deliberation orchestrator.
pub struct DeliberationEngine {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    config: CounselConfig,
    registry: ModelRegistry,
    transcripts: TranscriptWriter,
    similarity: Arc<SimilarityDetector>,
    graph: Option<Arc<GraphIntegration>>,
}

impl DeliberationEngine {
    pub fn new(
        adapters: HashMap<String, Arc<dyn Adapter>>,
        config: CounselConfig,
        graph: Option<Arc<GraphIntegration>>,
    ) -> Self {
        let registry = ModelRegistry::from_config(&config);
        let transcripts = TranscriptWriter::new(&config.storage.transcripts_dir);
        let similarity = Arc::new(SimilarityDetector::new(config.embeddings.as_ref()));
        Self {
            adapters,
            config,
            registry,
            transcripts,
            similarity,
            graph,
        }
    }

    /// Run one deliberation to completion.
    pub async fn execute(&self, request: DeliberateRequest) -> Result<DeliberationResult> {
        request.validate().map_err(CounselError::Validation)?;
        let participants = self.resolve_participants(&request)?;

        let rounds = match request.mode {
            DeliberationMode::Quick => 1,
            DeliberationMode::Conference => request.rounds,
        };
        let min_rounds = if self.config.deliberation.early_stopping.respect_min_rounds {
            self.config.defaults.rounds.min(rounds)
        } else {
            1
        };

        info!(
            question = %request.question,
            participants = participants.len(),
            rounds,
            mode = %request.mode,
            "Starting deliberation"
        );

        // Context assembly for round 1
        let graph_context = match &self.graph {
            Some(graph) => match graph.retrieve_context(&request.question).await {
                Ok(context) => context,
                Err(e) => {
                    warn!("Decision graph context retrieval failed (continuing): {e}");
                    String::new()
                }
            },
            None => String::new(),
        };

        let tool_executor = ToolExecutor::new(
            request.working_directory.clone(),
            self.config.deliberation.tool_security.clone(),
            self.config.deliberation.file_tree.clone(),
        );
        let file_tree = tool_executor.render_file_tree();

        let mut baseline_sections = Vec::new();
        if !graph_context.is_empty() {
            baseline_sections.push(graph_context.clone());
        }
        if let Some(context) = &request.context {
            if !context.is_empty() {
                baseline_sections.push(format!("## Caller Context\n\n{context}"));
            }
        }
        if !file_tree.is_empty() {
            baseline_sections.push(format!("## Project Files\n\n```\n{file_tree}\n```"));
        }
        let baseline_context = baseline_sections.join("\n\n");

        // Round loop
        let mut all_responses: Vec<RoundResponse> = Vec::new();
        let mut previous_round: Vec<RoundResponse> = Vec::new();
        let mut tracker = VoteTracker::new();
        let mut tool_executions: Vec<ToolExecution> = Vec::new();
        let mut convergence = self.config.deliberation.convergence_detection.enabled.then(|| {
            ConvergenceDetector::new(
                self.config.deliberation.convergence_detection.clone(),
                self.similarity.clone(),
            )
        });
        let mut rounds_completed = 0u32;
        let mut stop_reason = StopReason::RoundLimit;

        for round in 1..=rounds {
            let round_context = if round == 1 {
                baseline_context.clone()
            } else {
                let mut context = format!(
                    "## Debate So Far\n\n{}",
                    format_debate(&request.question, &all_responses)
                );
                let tool_context = format_tool_context(
                    &tool_executions,
                    round,
                    self.config.deliberation.tool_context_max_rounds,
                    self.config.deliberation.tool_output_max_chars,
                );
                if !tool_context.is_empty() {
                    context.push_str("\n\n");
                    context.push_str(&tool_context);
                }
                context
            };

            let current = self
                .run_round(&request, &participants, round, rounds, &round_context)
                .await;

            // Votes and tool requests from this round's responses
            for response in &current {
                tracker.record_response(round, &response.participant, &response.response);
                for tool_request in parse_tool_requests(&response.response) {
                    let (output, is_error) = match tool_executor.execute(&tool_request).await {
                        Ok(output) => (output, false),
                        Err(error) => (error, true),
                    };
                    tool_executions.push(ToolExecution {
                        round,
                        requested_by: response.participant.clone(),
                        tool: tool_request.name,
                        arguments: tool_request.arguments,
                        output,
                        is_error,
                    });
                }
            }

            // Convergence against the previous round
            let mut round_status = None;
            if let Some(detector) = convergence.as_mut() {
                if round >= 2 {
                    round_status = detector.check_round(round, &previous_round, &current).await;
                }
            }

            all_responses.extend(current.iter().cloned());
            previous_round = current;
            rounds_completed = round;

            if round < rounds {
                if round_status == Some(ConvergenceStatus::Converged) && round >= min_rounds {
                    info!(round, "Stopping: convergence detected");
                    stop_reason = StopReason::Converged;
                    break;
                }
                if round >= min_rounds
                    && tracker.should_stop_early(
                        round,
                        participants.len(),
                        &self.config.deliberation.early_stopping,
                    )
                {
                    info!(round, "Stopping: participants voted to end the debate");
                    stop_reason = StopReason::EarlyVote;
                    break;
                }
            }
        }

        // Summary
        let summary = self
            .summarize(&participants, &request.question, &all_responses)
            .await;

        // Voting + convergence assembly
        let voting_result = tracker.result();
        let convergence_info = convergence.map(|detector| {
            let hit_limit = stop_reason == StopReason::RoundLimit && !detector.detected();
            let mut info = detector.info(hit_limit);
            info.status = resolve_with_voting(info.status, voting_result.as_ref());
            info
        });

        let status = if rounds_completed == 0 {
            DeliberationStatus::Failed
        } else {
            DeliberationStatus::Complete
        };

        let mut result = DeliberationResult {
            status,
            mode: request.mode.to_string(),
            rounds_completed,
            participants: participants.iter().map(|p| p.identity.clone()).collect(),
            summary,
            full_debate: all_responses,
            convergence_info,
            voting_result,
            graph_context_summary: (!graph_context.is_empty()).then_some(graph_context),
            tool_executions,
            transcript_path: String::new(),
        };

        // Transcript, then persistence into the decision graph
        match self.transcripts.write(&request.question, &result) {
            Ok(path) => result.transcript_path = path.to_string_lossy().into_owned(),
            Err(e) => warn!("Transcript write failed (continuing): {e}"),
        }

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.store_deliberation(&request.question, &result).await {
                warn!("Failed to store deliberation in decision graph: {e}");
            }
        }

        info!(
            rounds_completed = result.rounds_completed,
            status = ?result.status,
            "Deliberation finished"
        );
        Ok(result)
    }

    fn resolve_participants(
        &self,
        request: &DeliberateRequest,
    ) -> Result<Vec<ResolvedParticipant>> {
        request
            .participants
            .iter()
            .map(|p| {
                let adapter = self.adapters.get(&p.adapter).cloned().ok_or_else(|| {
                    CounselError::Validation(format!(
                        "unknown adapter '{}' (registered: {})",
                        p.adapter,
                        self.registered_names()
                    ))
                })?;
                let model = p
                    .model
                    .clone()
                    .or_else(|| self.registry.get_default(&p.adapter).map(String::from))
                    .ok_or_else(|| {
                        CounselError::Validation(format!(
                            "no model given for adapter '{}' and no registry default",
                            p.adapter
                        ))
                    })?;
                if !self.registry.is_allowed(&p.adapter, &model) {
                    return Err(CounselError::Validation(format!(
                        "model '{model}' is not allowlisted for adapter '{}'",
                        p.adapter
                    )));
                }
                Ok(ResolvedParticipant {
                    identity: format!("{model}@{}", p.adapter),
                    adapter,
                    model,
                })
            })
            .collect()
    }

    fn registered_names(&self) -> String {
        let mut names: Vec<&str> = self.adapters.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names.join(", ")
    }

    /// Fan one round out to every participant in parallel. Failures are
    /// isolated: a failed invocation records an error sentinel as that
    /// participant's response and the round continues.
    async fn run_round(
        &self,
        request: &DeliberateRequest,
        participants: &[ResolvedParticipant],
        round: u32,
        total_rounds: u32,
        context: &str,
    ) -> Vec<RoundResponse> {
        let timeout = Duration::from_secs(self.config.defaults.timeout_per_round);
        let prompt = build_round_prompt(&request.question, round, total_rounds);
        let context = (!context.is_empty()).then_some(context);

        let futures = participants.iter().map(|participant| {
            let prompt = prompt.clone();
            let working_directory = request.working_directory.clone();
            async move {
                let invoke = InvokeRequest {
                    prompt: &prompt,
                    model: &participant.model,
                    context,
                    is_deliberation: true,
                    working_directory: Some(&working_directory),
                };
                let text = match tokio::time::timeout(timeout, participant.adapter.invoke(invoke))
                    .await
                {
                    Ok(Ok(text)) => text,
                    Ok(Err(e)) => {
                        warn!(
                            participant = %participant.identity,
                            round,
                            "Adapter failed: {e}"
                        );
                        format!("[ERROR: {}]", e.sentinel())
                    }
                    Err(_) => {
                        warn!(
                            participant = %participant.identity,
                            round,
                            timeout_secs = timeout.as_secs(),
                            "Adapter timed out at the round boundary"
                        );
                        "[ERROR: TIMEOUT]".to_string()
                    }
                };
                RoundResponse {
                    round,
                    participant: participant.identity.clone(),
                    response: text,
                    timestamp: Utc::now(),
                }
            }
        });

        let responses = join_all(futures).await;
        debug!(round, responses = responses.len(), "Round complete");
        responses
    }

    /// Invoke the configured summarizer (or the first participant) once
    /// over the whole debate.
    async fn summarize(
        &self,
        participants: &[ResolvedParticipant],
        question: &str,
        responses: &[RoundResponse],
    ) -> Summary {
        let configured = self.config.defaults.summarizer.as_ref().and_then(|s| {
            self.adapters
                .get(&s.adapter)
                .map(|adapter| (adapter.clone(), s.model.clone()))
        });
        let (adapter, model) = match configured {
            Some(pair) => pair,
            None => match participants.first() {
                Some(p) => (p.adapter.clone(), p.model.clone()),
                None => {
                    return Summary {
                        consensus: "[Summary generation failed]".into(),
                        key_agreements: vec![],
                        key_disagreements: vec![],
                        final_recommendation: "No participants available".into(),
                    };
                }
            },
        };
        debug!(model = %model, "Generating summary");
        Summarizer::new(adapter, model).generate(question, responses).await
    }
}

fn build_round_prompt(question: &str, round: u32, total_rounds: u32) -> String {
    if round == 1 {
        format!(
            "You are participating in round 1 of {total_rounds} of a structured \
             deliberation among AI models.\n\n\
             QUESTION: {question}\n\n\
             Give your analysis and position.\n\n\
             When you have a clear position, end your response with a single line:\n\
             VOTE: {{\"option\": \"<your position>\", \"confidence\": <0.0-1.0>, \
             \"rationale\": \"<one sentence>\", \"continue_debate\": <true|false>}}\n\n\
             To gather evidence from the working directory, emit a line:\n\
             TOOL_REQUEST: {{\"name\": \"read_file|search_code|list_files|run_command|get_file_tree\", \
             \"arguments\": {{...}}}}"
        )
    } else {
        format!(
            "ROUND {round} of {total_rounds}. The debate so far is provided above.\n\n\
             QUESTION: {question}\n\n\
             Review the other participants' positions, address the strongest \
             disagreement with your own, then restate or revise your position. \
             End with your VOTE line; set \"continue_debate\": false when you \
             are satisfied with the outcome."
        )
    }
}
