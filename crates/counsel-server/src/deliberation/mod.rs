// crates/counsel-server/src/deliberation/mod.rs
// Deliberation engine: rounds, convergence, voting, summary, tools

pub mod convergence;
pub mod engine;
pub mod summarizer;
pub mod tools;
pub mod transcript;
pub mod voting;

pub use convergence::{ConvergenceDetector, resolve_with_voting};
pub use engine::DeliberationEngine;
pub use summarizer::{Summarizer, parse_summary};
pub use tools::{ToolExecutor, ToolRequest, parse_tool_requests};
pub use transcript::TranscriptWriter;
pub use voting::{VoteTracker, parse_vote};
