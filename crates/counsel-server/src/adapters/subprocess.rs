// crates/counsel-server/src/adapters/subprocess.rs
// Shared subprocess execution for CLI-backed adapters

use super::error::AdapterError;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Shared runner for CLI tool adapters.
///
/// Holds the command, argument templates, and timeout; adapters shape
/// the argument list per call and delegate execution here. Placeholders
/// `{model}`, `{prompt}`, and `{working_directory}` are substituted into
/// each template argument.
pub struct CliRunner {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CliRunner {
    pub fn new(command: String, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            args,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Substitute placeholders into a set of argument templates.
    pub fn format_args(
        templates: &[String],
        model: &str,
        prompt: &str,
        working_directory: &str,
    ) -> Vec<String> {
        templates
            .iter()
            .map(|arg| {
                arg.replace("{model}", model)
                    .replace("{prompt}", prompt)
                    .replace("{working_directory}", working_directory)
            })
            .collect()
    }

    /// Spawn the command with the given (already formatted) arguments.
    ///
    /// Stdin is closed; stdout/stderr are captured. A non-zero exit code
    /// becomes `AdapterError::Fatal` carrying stderr. The whole call is
    /// bounded by the runner's timeout; exceeding it kills the child.
    pub async fn run(&self, args: Vec<String>, working_directory: &str) -> Result<String, AdapterError> {
        info!(
            command = %self.command,
            cwd = %working_directory,
            arg_count = args.len(),
            "Executing CLI adapter"
        );
        debug!(
            "Full command: {} {:?}... (args truncated)",
            self.command,
            &args[..args.len().min(3)]
        );

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(working_directory)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(command = %self.command, error = %e, "Failed to spawn CLI process");
                return Err(AdapterError::Fatal(format!(
                    "failed to spawn '{}': {}",
                    self.command, e
                )));
            }
            Err(_) => {
                error!(
                    command = %self.command,
                    timeout = self.timeout.as_secs(),
                    "CLI invocation timed out"
                );
                return Err(AdapterError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(
                command = %self.command,
                code = output.status.code().unwrap_or(-1),
                error = %stderr.chars().take(200).collect::<String>(),
                "CLI process failed"
            );
            return Err(AdapterError::Fatal(format!(
                "CLI process failed: {stderr}"
            )));
        }

        let raw = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(
            command = %self.command,
            output_length = raw.len(),
            "CLI adapter completed"
        );
        Ok(raw)
    }
}

/// Prepend context to a prompt with a blank-line separator.
pub fn compose_prompt(context: Option<&str>, prompt: &str) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!("{ctx}\n\n{prompt}"),
        _ => prompt.to_string(),
    }
}
