// crates/counsel-server/src/adapters/claude.rs
// Claude CLI adapter

use super::error::AdapterError;
use super::subprocess::{CliRunner, compose_prompt};
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;

/// Banner keywords identifying header lines in CLI output.
const BANNER_KEYWORDS: [&str; 4] = ["claude code", "loading", "version", "initializing"];

/// Adapter for the `claude` CLI tool.
///
/// Toggles the project-context flag (`-p`) by call context: during a
/// deliberation the flag is stripped so the model engages with the
/// debate alone; outside one it is inserted for workspace awareness.
pub struct ClaudeAdapter {
    runner: CliRunner,
}

impl ClaudeAdapter {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }

    /// Add or remove the `-p` flag depending on call context.
    fn adjust_args_for_context(&self, is_deliberation: bool) -> Vec<String> {
        let mut args = self.runner.args.clone();
        if is_deliberation {
            args.retain(|a| a != "-p");
        } else if !args.iter().any(|a| a == "-p") {
            match args.iter().position(|a| a == "--model") {
                // Insert after --model and its value
                Some(idx) if idx + 2 <= args.len() => args.insert(idx + 2, "-p".into()),
                _ => args.insert(0, "-p".into()),
            }
        }
        args
    }

    /// Strip leading banner lines; the response starts at the first
    /// substantial line that isn't initialization chatter.
    fn parse_output(raw: &str) -> String {
        let lines: Vec<&str> = raw.trim().lines().collect();
        let start = lines
            .iter()
            .position(|line| {
                let lower = line.trim().to_lowercase();
                !lower.is_empty() && !BANNER_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .unwrap_or(0);
        lines[start..].join("\n").trim().to_string()
    }
}

#[async_trait]
impl Adapter for ClaudeAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let templates = self.adjust_args_for_context(req.is_deliberation);
        let cwd = req.cwd();
        let args = CliRunner::format_args(&templates, req.model, &full_prompt, &cwd);
        let raw = self.runner.run(args, &cwd).await?;
        Ok(Self::parse_output(&raw))
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Claude
    }
}
