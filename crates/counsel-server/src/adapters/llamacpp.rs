// crates/counsel-server/src/adapters/llamacpp.rs
// llama.cpp CLI adapter with GGUF model auto-discovery
//
// llama-cli interleaves verbose runtime metadata with the actual model
// response; parse_output() filters the known metadata lines out.

use super::error::AdapterError;
use super::subprocess::{CliRunner, compose_prompt};
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Default directories searched for GGUF model files.
const DEFAULT_SEARCH_PATHS: [&str; 6] = [
    "~/.cache/llama.cpp/models",
    "~/models",
    "~/llama.cpp/models",
    "/usr/local/share/llama.cpp/models",
    "~/.ollama/models",
    "~/.lmstudio/models",
];

/// Colon-separated extra search paths.
const SEARCH_PATH_ENV: &str = "LLAMA_CPP_MODEL_PATH";

/// Output lines starting with these prefixes are runtime metadata.
const METADATA_PREFIXES: [&str; 11] = [
    "llama_model_loader:",
    "llm_load_print_meta:",
    "llama_new_context_with_model:",
    "llama_print_timings:",
    "sampling:",
    "generate:",
    "llm_load_tensors:",
    "llama_kv_cache_init:",
    "system_info:",
    "ggml_",
    "gguf_",
];

/// Lines matching these exactly are interactive-prompt noise.
const METADATA_EXACT: [&str; 3] = ["> EOF by user", ">", "EOF"];

/// Cap on candidates enumerated in a model-not-found error.
const MAX_LISTED_MODELS: usize = 10;

/// Adapter for the `llama-cli` tool.
pub struct LlamaCppAdapter {
    runner: CliRunner,
    search_paths: Vec<String>,
}

impl LlamaCppAdapter {
    pub fn new(runner: CliRunner) -> Self {
        Self {
            runner,
            search_paths: DEFAULT_SEARCH_PATHS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Override the default search paths (used by tests).
    pub fn with_search_paths(runner: CliRunner, search_paths: Vec<String>) -> Self {
        Self {
            runner,
            search_paths,
        }
    }

    /// Resolve a model name to a filesystem path.
    ///
    /// Absolute and existing relative paths are used as-is; otherwise
    /// search paths are scanned for `*.gguf` files whose stem contains
    /// the name (case-insensitive). Multiple matches prefer exact
    /// stem/filename equality, then shortest path.
    fn resolve_model_path(&self, model: &str) -> Result<PathBuf, AdapterError> {
        let as_path = Path::new(model);
        if as_path.is_absolute() && as_path.exists() {
            return Ok(as_path.to_path_buf());
        }
        if as_path.exists() {
            return Ok(as_path
                .canonicalize()
                .unwrap_or_else(|_| as_path.to_path_buf()));
        }

        let search_paths = self.expanded_search_paths();
        let matches = find_models_by_name(model, &search_paths);

        if matches.is_empty() {
            return Err(AdapterError::ModelNotFound(format!(
                "'{}'\n\nSearched in:\n{}\n\nAvailable models:\n{}\n\n\
                 Tips:\n  - Use a full path: '/path/to/model.gguf'\n  \
                 - Set {SEARCH_PATH_ENV} to add search paths",
                model,
                search_paths
                    .iter()
                    .map(|p| format!("  - {}", p.display()))
                    .collect::<Vec<_>>()
                    .join("\n"),
                format_available_models(&search_paths),
            )));
        }

        if matches.len() == 1 {
            return Ok(matches.into_iter().next().unwrap_or_default());
        }

        // Prefer an exact stem or filename match
        if let Some(exact) = matches.iter().find(|p| {
            p.file_stem().map(|s| s.to_string_lossy() == model).unwrap_or(false)
                || p.file_name().map(|s| s.to_string_lossy() == model).unwrap_or(false)
        }) {
            return Ok(exact.clone());
        }

        // Otherwise the shortest path is the most likely intent
        Ok(matches
            .into_iter()
            .min_by_key(|p| p.as_os_str().len())
            .unwrap_or_default())
    }

    /// Expand `~`, merge in env-supplied paths, and deduplicate.
    fn expanded_search_paths(&self) -> Vec<PathBuf> {
        let mut raw: Vec<String> = Vec::new();
        if let Ok(env_paths) = std::env::var(SEARCH_PATH_ENV) {
            raw.extend(env_paths.split(':').map(|s| s.to_string()));
        }
        raw.extend(self.search_paths.iter().cloned());

        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for path in raw {
            let expanded = expand_home(&path);
            if seen.insert(expanded.clone()) {
                out.push(expanded);
            }
        }
        out
    }

    /// Filter out llama.cpp runtime metadata lines.
    fn parse_output(raw: &str) -> String {
        raw.trim()
            .lines()
            .filter(|line| {
                let stripped = line.trim();
                let is_metadata = METADATA_PREFIXES.iter().any(|p| stripped.starts_with(p));
                let is_exact = METADATA_EXACT.contains(&stripped);
                !is_metadata && !is_exact
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

#[async_trait]
impl Adapter for LlamaCppAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let resolved = self.resolve_model_path(req.model)?;
        let resolved = resolved.to_string_lossy();

        let full_prompt = compose_prompt(req.context, req.prompt);
        let cwd = req.cwd();
        let args = CliRunner::format_args(&self.runner.args, &resolved, &full_prompt, &cwd);
        let raw = self.runner.run(args, &cwd).await?;
        Ok(Self::parse_output(&raw))
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::LlamaCpp
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Find GGUF files whose stem fuzzily matches the name.
fn find_models_by_name(name: &str, search_paths: &[PathBuf]) -> Vec<PathBuf> {
    let name_lower = name.to_lowercase();
    let mut matches = Vec::new();
    for root in search_paths {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().map(|e| e == "gguf").unwrap_or(false) {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                if stem.contains(&name_lower) {
                    matches.push(path.to_path_buf());
                }
            }
        }
    }
    matches
}

/// Bounded listing of discoverable models for error messages.
fn format_available_models(search_paths: &[PathBuf]) -> String {
    let mut all = Vec::new();
    for root in search_paths {
        if !root.exists() {
            continue;
        }
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().map(|e| e == "gguf").unwrap_or(false) {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default();
                all.push(format!("  - {} ({})", stem, path.display()));
            }
        }
    }
    if all.is_empty() {
        return "  (No .gguf models found in search paths)".into();
    }
    if all.len() > MAX_LISTED_MODELS {
        let extra = all.len() - MAX_LISTED_MODELS;
        all.truncate(MAX_LISTED_MODELS);
        all.push(format!("  ... and {extra} more"));
    }
    all.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter_with_dir(dir: &Path) -> LlamaCppAdapter {
        LlamaCppAdapter::with_search_paths(
            CliRunner::new("llama-cli".into(), vec!["-m".into(), "{model}".into()], 10),
            vec![dir.to_string_lossy().into_owned()],
        )
    }

    #[test]
    fn test_resolve_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("model.gguf");
        std::fs::write(&model, b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        assert_eq!(adapter.resolve_model_path(model.to_str().unwrap()).unwrap(), model);
    }

    #[test]
    fn test_resolve_fuzzy_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("llama-2-7b-chat.Q4_K_M.gguf"), b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        let resolved = adapter.resolve_model_path("llama-2-7b").unwrap();
        assert!(resolved.to_string_lossy().contains("llama-2-7b-chat"));
    }

    #[test]
    fn test_resolve_prefers_exact_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mistral.gguf"), b"gguf").unwrap();
        std::fs::write(dir.path().join("mistral-instruct-v0.2.gguf"), b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        let resolved = adapter.resolve_model_path("mistral").unwrap();
        assert_eq!(
            resolved.file_name().map(|f| f.to_string_lossy().into_owned()),
            Some("mistral.gguf".to_string())
        );
    }

    #[test]
    fn test_resolve_multiple_matches_shortest_path() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply/nested/folder");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("phi-3-mini.gguf"), b"gguf").unwrap();
        std::fs::write(nested.join("phi-3-mini-4k.gguf"), b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        let resolved = adapter.resolve_model_path("phi-3").unwrap();
        assert!(resolved.to_string_lossy().ends_with("phi-3-mini.gguf"));
    }

    #[test]
    fn test_resolve_not_found_lists_paths_and_candidates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("qwen2-7b.gguf"), b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        let err = adapter.resolve_model_path("nonexistent-model").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Searched in:"));
        assert!(msg.contains(&dir.path().to_string_lossy().into_owned()));
        assert!(msg.contains("qwen2-7b"));
    }

    #[test]
    fn test_case_insensitive_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Llama-3-8B.gguf"), b"gguf").unwrap();

        let adapter = adapter_with_dir(dir.path());
        assert!(adapter.resolve_model_path("llama-3").is_ok());
    }

    #[test]
    fn test_parse_output_filters_metadata() {
        let raw = "llama_model_loader: loaded meta data\n\
                   llm_load_print_meta: model type = 7B\n\
                   sampling: repeat_last_n = 64\n\
                   The capital of France is Paris.\n\
                   llama_print_timings: load time = 500 ms\n\
                   > EOF by user";
        assert_eq!(
            LlamaCppAdapter::parse_output(raw),
            "The capital of France is Paris."
        );
    }

    #[test]
    fn test_parse_output_multiline_response() {
        let raw = "system_info: n_threads = 8\nLine one.\nLine two.\nggml_metal_init: found device";
        assert_eq!(LlamaCppAdapter::parse_output(raw), "Line one.\nLine two.");
    }

    #[test]
    fn test_parse_output_clean() {
        assert_eq!(LlamaCppAdapter::parse_output("plain answer\n"), "plain answer");
    }
}
