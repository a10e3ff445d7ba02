// crates/counsel-server/src/adapters/gemini.rs
// Gemini CLI adapter

use super::error::AdapterError;
use super::subprocess::{CliRunner, compose_prompt};
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;

/// The backing API rejects prompts around 30k+ tokens; 100k characters
/// (~25k tokens at 4 chars/token) is a safe ceiling that turns the
/// rejection into a local error before any subprocess is spawned.
const MAX_PROMPT_CHARS: usize = 100_000;

/// Adapter for the `gemini` CLI tool.
pub struct GeminiAdapter {
    runner: CliRunner,
}

impl GeminiAdapter {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Adapter for GeminiAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        if full_prompt.len() > MAX_PROMPT_CHARS {
            return Err(AdapterError::PromptTooLong {
                len: full_prompt.len(),
                limit: MAX_PROMPT_CHARS,
            });
        }

        let cwd = req.cwd();
        let args = CliRunner::format_args(&self.runner.args, req.model, &full_prompt, &cwd);
        let raw = self.runner.run(args, &cwd).await?;
        Ok(raw.trim().to_string())
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Gemini
    }
}
