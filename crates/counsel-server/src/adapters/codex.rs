// crates/counsel-server/src/adapters/codex.rs
// Codex CLI adapter

use super::error::AdapterError;
use super::subprocess::{CliRunner, compose_prompt};
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;

/// Adapter for the `codex` CLI tool.
///
/// Output is clean (no header/footer text), so parsing is a trim. The
/// model is configured in the tool's own config file, not as an
/// argument, but the `{model}` placeholder is still substituted for
/// configs that do pass it.
pub struct CodexAdapter {
    runner: CliRunner,
}

impl CodexAdapter {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Adapter for CodexAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let cwd = req.cwd();
        let args = CliRunner::format_args(&self.runner.args, req.model, &full_prompt, &cwd);
        let raw = self.runner.run(args, &cwd).await?;
        Ok(raw.trim().to_string())
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Codex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invoke_trims_output() {
        // `echo` stands in for the real CLI
        let adapter = CodexAdapter::new(CliRunner::new(
            "echo".into(),
            vec!["{prompt}".into()],
            10,
        ));
        let out = adapter
            .invoke(InvokeRequest::new("hello there", "gpt-5"))
            .await
            .unwrap();
        assert_eq!(out, "hello there");
    }

    #[tokio::test]
    async fn test_invoke_prepends_context() {
        let adapter = CodexAdapter::new(CliRunner::new(
            "echo".into(),
            vec!["{prompt}".into()],
            10,
        ));
        let out = adapter
            .invoke(InvokeRequest::new("question", "m").with_context(Some("background")))
            .await
            .unwrap();
        assert_eq!(out, "background\n\nquestion");
    }
}
