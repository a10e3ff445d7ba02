// crates/counsel-server/src/deliberation/tools.rs
// Evidence-gathering tools available to participants mid-debate
//
// Responses may carry TOOL_REQUEST markers; the engine executes the
// requested tool against the caller's working directory and injects the
// output into the next round's context. Paths outside the working
// directory and excluded patterns are rejected.

use crate::config::{FileTreeConfig, ToolSecurityConfig};
use counsel_types::ToolExecution;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{info, warn};
use walkdir::WalkDir;

/// Marker preceding the JSON tool request in a response.
pub const TOOL_REQUEST_MARKER: &str = "TOOL_REQUEST:";

/// Cap on matches returned by search_code.
const SEARCH_MAX_MATCHES: usize = 50;

/// Timeout for run_command executions.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// One parsed tool request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolRequest {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// Extract tool requests from a response.
pub fn parse_tool_requests(response: &str) -> Vec<ToolRequest> {
    let mut requests = Vec::new();
    for line in response.lines() {
        let trimmed = line.trim();
        let Some(rest) = trimmed.strip_prefix(TOOL_REQUEST_MARKER) else {
            continue;
        };
        match serde_json::from_str::<ToolRequest>(rest.trim()) {
            Ok(request) => requests.push(request),
            Err(e) => warn!("Unparseable tool request ignored: {e}"),
        }
    }
    requests
}

/// Executes authorized tools rooted at the deliberation's working
/// directory.
pub struct ToolExecutor {
    working_directory: PathBuf,
    security: ToolSecurityConfig,
    file_tree: FileTreeConfig,
}

impl ToolExecutor {
    pub fn new(
        working_directory: impl Into<PathBuf>,
        security: ToolSecurityConfig,
        file_tree: FileTreeConfig,
    ) -> Self {
        Self {
            working_directory: working_directory.into(),
            security,
            file_tree,
        }
    }

    /// Run one tool request; errors come back as strings so the engine
    /// can inject them as non-fatal "error" blocks.
    pub async fn execute(&self, request: &ToolRequest) -> Result<String, String> {
        info!(tool = %request.name, "Executing deliberation tool");
        match request.name.as_str() {
            "read_file" => self.read_file(&request.arguments),
            "search_code" => self.search_code(&request.arguments),
            "list_files" => self.list_files(&request.arguments),
            "run_command" => self.run_command(&request.arguments).await,
            "get_file_tree" => Ok(self.render_file_tree()),
            other => Err(format!(
                "unknown tool '{other}' (available: read_file, search_code, list_files, run_command, get_file_tree)"
            )),
        }
    }

    /// Resolve a caller-supplied relative path, rejecting traversal
    /// outside the working directory and excluded patterns.
    fn resolve_path(&self, relative: &str) -> Result<PathBuf, String> {
        if self.is_excluded(relative) {
            return Err(format!("path '{relative}' is excluded from tool access"));
        }
        let root = self
            .working_directory
            .canonicalize()
            .map_err(|e| format!("working directory unavailable: {e}"))?;
        let candidate = root.join(relative);
        let resolved = candidate
            .canonicalize()
            .map_err(|e| format!("path '{relative}' not found: {e}"))?;
        if !resolved.starts_with(&root) {
            return Err(format!(
                "path '{relative}' escapes the working directory"
            ));
        }
        Ok(resolved)
    }

    fn is_excluded(&self, relative: &str) -> bool {
        let normalized = relative.trim_start_matches("./");
        self.security.exclude_patterns.iter().any(|pattern| {
            let pattern = pattern.trim_end_matches("**").trim_end_matches('/');
            if pattern.is_empty() {
                return false;
            }
            normalized == pattern
                || normalized.starts_with(&format!("{pattern}/"))
                || normalized.contains(&format!("/{pattern}/"))
        })
    }

    fn read_file(&self, args: &serde_json::Value) -> Result<String, String> {
        let path = required_str(args, "path")?;
        let resolved = self.resolve_path(path)?;

        let size = std::fs::metadata(&resolved)
            .map_err(|e| format!("cannot stat '{path}': {e}"))?
            .len();
        if size > self.security.max_file_size_bytes {
            return Err(format!(
                "file '{path}' is {size} bytes, over the {} byte limit",
                self.security.max_file_size_bytes
            ));
        }
        std::fs::read_to_string(&resolved).map_err(|e| format!("cannot read '{path}': {e}"))
    }

    fn search_code(&self, args: &serde_json::Value) -> Result<String, String> {
        let query = required_str(args, "query")?;
        if query.is_empty() {
            return Err("query must not be empty".into());
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(&self.working_directory)
            .into_iter()
            .filter_entry(|e| !self.entry_excluded(e.path()))
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX)
                > self.security.max_file_size_bytes
            {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(entry.path()) else {
                continue; // binary or unreadable
            };
            let display = self.display_path(entry.path());
            for (idx, line) in content.lines().enumerate() {
                if line.contains(query) {
                    matches.push(format!("{display}:{}: {}", idx + 1, line.trim()));
                    if matches.len() >= SEARCH_MAX_MATCHES {
                        matches.push(format!("... (capped at {SEARCH_MAX_MATCHES} matches)"));
                        return Ok(matches.join("\n"));
                    }
                }
            }
        }

        if matches.is_empty() {
            Ok(format!("No matches for '{query}'"))
        } else {
            Ok(matches.join("\n"))
        }
    }

    fn list_files(&self, args: &serde_json::Value) -> Result<String, String> {
        let relative = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let resolved = self.resolve_path(relative)?;

        let mut names = Vec::new();
        let entries = std::fs::read_dir(&resolved)
            .map_err(|e| format!("cannot list '{relative}': {e}"))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = if relative == "." {
                name.clone()
            } else {
                format!("{relative}/{name}")
            };
            if self.is_excluded(&rel) {
                continue;
            }
            let suffix = if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                "/"
            } else {
                ""
            };
            names.push(format!("{name}{suffix}"));
        }
        names.sort();
        Ok(names.join("\n"))
    }

    async fn run_command(&self, args: &serde_json::Value) -> Result<String, String> {
        let command = required_str(args, "command")?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.working_directory)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(COMMAND_TIMEOUT, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(format!("failed to execute: {e}")),
            Err(_) => {
                return Err(format!(
                    "command timed out after {}s",
                    COMMAND_TIMEOUT.as_secs()
                ));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        Ok(if stderr.is_empty() {
            format!("Exit: {code}\n{stdout}")
        } else {
            format!("Exit: {code}\nstdout:\n{stdout}\nstderr:\n{stderr}")
        })
    }

    /// Bounded directory tree for round-1 context.
    pub fn render_file_tree(&self) -> String {
        if !self.file_tree.enabled {
            return String::new();
        }
        let mut lines = Vec::new();
        for entry in WalkDir::new(&self.working_directory)
            .min_depth(1)
            .max_depth(self.file_tree.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.entry_excluded(e.path()))
            .filter_map(|e| e.ok())
        {
            if lines.len() >= self.file_tree.max_files {
                lines.push("... (truncated)".to_string());
                break;
            }
            let depth = entry.depth().saturating_sub(1);
            let name = entry.file_name().to_string_lossy();
            let suffix = if entry.file_type().is_dir() { "/" } else { "" };
            lines.push(format!("{}{}{}", "  ".repeat(depth), name, suffix));
        }
        lines.join("\n")
    }

    fn entry_excluded(&self, path: &Path) -> bool {
        let rel = path
            .strip_prefix(&self.working_directory)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        !rel.is_empty() && self.is_excluded(&rel)
    }

    fn display_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.working_directory)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }
}

fn required_str<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("missing required argument '{key}'"))
}

/// Format the recent window of tool executions for injection into the
/// next round's context. Only executions from the last `max_rounds`
/// rounds are included, each truncated to `max_chars`.
pub fn format_tool_context(
    executions: &[ToolExecution],
    current_round: u32,
    max_rounds: u32,
    max_chars: usize,
) -> String {
    let recent: Vec<&ToolExecution> = executions
        .iter()
        .filter(|e| e.round + max_rounds >= current_round)
        .collect();
    if recent.is_empty() {
        return String::new();
    }

    let mut out = String::from("## Recent Tool Results\n");
    for exec in recent {
        let mut output = exec.output.clone();
        if output.chars().count() > max_chars {
            output = output.chars().take(max_chars).collect();
            output.push_str("... (truncated)");
        }
        out.push_str(&format!(
            "\n### {} `{}` (round {}, requested by {})\n```\n{}\n```\n",
            if exec.is_error { "error" } else { "result" },
            exec.tool,
            exec.round,
            exec.requested_by,
            output
        ));
    }
    out
}
