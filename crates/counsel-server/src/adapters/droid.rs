// crates/counsel-server/src/adapters/droid.rs
// Droid CLI adapter with graceful permission escalation

use super::error::AdapterError;
use super::subprocess::{CliRunner, compose_prompt};
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;
use tracing::{debug, error, info};

/// Permission levels tried in order.
const PERMISSION_LEVELS: [&str; 3] = ["low", "medium", "high"];

/// Error substring that signals a permission problem worth escalating.
const PERMISSION_ERROR_MARKER: &str = "insufficient permission to proceed";

/// Adapter for the `droid` CLI tool.
///
/// Executes with `--auto low` first and escalates to `medium`, then
/// `high` when the tool reports insufficient permissions. Any
/// non-permission failure aborts immediately; all three levels failing
/// is fatal.
pub struct DroidAdapter {
    runner: CliRunner,
}

impl DroidAdapter {
    pub fn new(runner: CliRunner) -> Self {
        Self { runner }
    }

    /// Inject `--auto <level>` after the `exec` subcommand.
    fn inject_permission_level(args: &[String], level: &str) -> Vec<String> {
        let mut out = args.to_vec();
        if out.first().map(|a| a.as_str()) != Some("exec") {
            tracing::warn!(
                "Unexpected droid args shape {:?}; injecting permission level anyway",
                out
            );
        }
        let at = if out.is_empty() { 0 } else { 1 };
        out.insert(at, "--auto".into());
        out.insert(at + 1, level.into());
        out
    }

    fn is_permission_error(err: &AdapterError) -> bool {
        matches!(err, AdapterError::Fatal(msg) if msg.to_lowercase().contains(PERMISSION_ERROR_MARKER))
    }
}

#[async_trait]
impl Adapter for DroidAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let cwd = req.cwd();
        let mut last_error: Option<AdapterError> = None;

        for level in PERMISSION_LEVELS {
            let templates = Self::inject_permission_level(&self.runner.args, level);
            let args = CliRunner::format_args(&templates, req.model, &full_prompt, &cwd);

            match self.runner.run(args, &cwd).await {
                Ok(raw) => {
                    if level != "low" {
                        info!(
                            level = %level,
                            "Droid succeeded after permission escalation"
                        );
                    }
                    return Ok(raw.trim().to_string());
                }
                Err(err) if Self::is_permission_error(&err) => {
                    debug!(level = %level, "Droid permission denied, trying next level");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error recorded".into());
        error!(
            levels = ?PERMISSION_LEVELS,
            error = %detail,
            "Droid failed at every permission level"
        );
        Err(AdapterError::PermissionExhausted(detail))
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Droid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_after_exec() {
        let args: Vec<String> = ["exec", "-m", "{model}", "{prompt}"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = DroidAdapter::inject_permission_level(&args, "low");
        assert_eq!(out, vec!["exec", "--auto", "low", "-m", "{model}", "{prompt}"]);
    }

    #[test]
    fn test_inject_unexpected_shape() {
        let args: Vec<String> = ["run", "{prompt}"].iter().map(|s| s.to_string()).collect();
        let out = DroidAdapter::inject_permission_level(&args, "medium");
        assert_eq!(out, vec!["run", "--auto", "medium", "{prompt}"]);
    }

    #[test]
    fn test_permission_error_detection() {
        let err = AdapterError::Fatal("CLI process failed: Insufficient permission to proceed".into());
        assert!(DroidAdapter::is_permission_error(&err));
        let other = AdapterError::Fatal("segfault".into());
        assert!(!DroidAdapter::is_permission_error(&other));
        let transient = AdapterError::Transient("insufficient permission to proceed".into());
        assert!(!DroidAdapter::is_permission_error(&transient));
    }

    #[tokio::test]
    async fn test_non_permission_error_aborts_immediately() {
        // A command that always fails with a non-permission message
        let adapter = DroidAdapter::new(CliRunner::new(
            "sh".into(),
            vec!["exec".into(), "-c-this-is-invalid".into()],
            10,
        ));
        let err = adapter
            .invoke(InvokeRequest::new("prompt text", "model"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_all_levels_exhausted() {
        // Script that always reports a permission error on stderr
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("droid-stub.sh");
        std::fs::write(
            &script,
            "#!/bin/sh\necho 'insufficient permission to proceed' >&2\nexit 1\n",
        )
        .unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let adapter = DroidAdapter::new(CliRunner::new(
            script.to_string_lossy().into_owned(),
            vec!["exec".into(), "{prompt}".into()],
            10,
        ));
        let err = adapter
            .invoke(InvokeRequest::new("prompt text", "model"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::PermissionExhausted(_)));
    }
}
