// crates/counsel-server/src/adapters/mod.rs
// Backend adapter abstraction: one uniform invoke() contract over
// subprocess CLI tools and HTTP APIs

mod claude;
mod codex;
mod droid;
mod error;
mod gemini;
mod http;
mod llamacpp;
mod lmstudio;
mod ollama;
mod openrouter;
mod subprocess;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use droid::DroidAdapter;
pub use error::AdapterError;
pub use gemini::GeminiAdapter;
pub use http::{HttpInvoker, extract_chat_content, is_retryable_status};
pub use llamacpp::LlamaCppAdapter;
pub use lmstudio::LmStudioAdapter;
pub use ollama::OllamaAdapter;
pub use openrouter::OpenRouterAdapter;
pub use subprocess::{CliRunner, compose_prompt};

use crate::config::AdapterConfig;
use crate::error::{CounselError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Closed set of adapter kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Claude,
    Codex,
    Droid,
    Gemini,
    LlamaCpp,
    Ollama,
    LmStudio,
    OpenRouter,
}

impl AdapterKind {
    /// Parse an adapter kind from its configured name.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "droid" => Some(Self::Droid),
            "gemini" => Some(Self::Gemini),
            "llamacpp" => Some(Self::LlamaCpp),
            "ollama" => Some(Self::Ollama),
            "lmstudio" => Some(Self::LmStudio),
            "openrouter" => Some(Self::OpenRouter),
            _ => None,
        }
    }

    /// Whether this kind is backed by a subprocess CLI tool.
    pub fn is_cli(&self) -> bool {
        matches!(
            self,
            Self::Claude | Self::Codex | Self::Droid | Self::Gemini | Self::LlamaCpp
        )
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Droid => "droid",
            Self::Gemini => "gemini",
            Self::LlamaCpp => "llamacpp",
            Self::Ollama => "ollama",
            Self::LmStudio => "lmstudio",
            Self::OpenRouter => "openrouter",
        };
        write!(f, "{s}")
    }
}

/// One adapter invocation.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    /// Prepended to the prompt with a blank-line separator when present.
    pub context: Option<&'a str>,
    /// Whether this call is part of a multi-model deliberation (some
    /// adapters shape their arguments differently outside one).
    pub is_deliberation: bool,
    pub working_directory: Option<&'a str>,
}

impl<'a> InvokeRequest<'a> {
    pub fn new(prompt: &'a str, model: &'a str) -> Self {
        Self {
            prompt,
            model,
            context: None,
            is_deliberation: true,
            working_directory: None,
        }
    }

    pub fn with_context(mut self, context: Option<&'a str>) -> Self {
        self.context = context;
        self
    }

    pub fn with_working_directory(mut self, dir: Option<&'a str>) -> Self {
        self.working_directory = dir;
        self
    }

    /// Resolve the working directory, defaulting to the process CWD.
    pub fn cwd(&self) -> String {
        match self.working_directory {
            Some(dir) if !dir.is_empty() => dir.to_string(),
            _ => std::env::current_dir()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|_| ".".to_string()),
        }
    }
}

/// Uniform contract over all backends.
///
/// Adapters are reentrant: the engine fans out concurrent invocations
/// and each call uses its own subprocess or HTTP request context.
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn invoke(&self, req: InvokeRequest<'_>) -> std::result::Result<String, AdapterError>;

    fn kind(&self) -> AdapterKind;
}

/// Create an adapter for the given registered name.
pub fn create_adapter(name: &str, config: &AdapterConfig) -> Result<Arc<dyn Adapter>> {
    let kind = AdapterKind::from_str(name).ok_or_else(|| {
        CounselError::Config(format!(
            "unknown adapter '{name}' (supported: claude, codex, droid, gemini, \
             llamacpp, ollama, lmstudio, openrouter)"
        ))
    })?;

    match (kind, config) {
        (kind, AdapterConfig::Cli { command, args, timeout }) if kind.is_cli() => {
            let runner = CliRunner::new(command.clone(), args.clone(), *timeout);
            let adapter: Arc<dyn Adapter> = match kind {
                AdapterKind::Claude => Arc::new(ClaudeAdapter::new(runner)),
                AdapterKind::Codex => Arc::new(CodexAdapter::new(runner)),
                AdapterKind::Droid => Arc::new(DroidAdapter::new(runner)),
                AdapterKind::Gemini => Arc::new(GeminiAdapter::new(runner)),
                AdapterKind::LlamaCpp => Arc::new(LlamaCppAdapter::new(runner)),
                _ => unreachable!(),
            };
            Ok(adapter)
        }
        (
            kind,
            AdapterConfig::Http {
                base_url,
                api_key,
                headers,
                timeout,
                max_retries,
            },
        ) if !kind.is_cli() => {
            let invoker = HttpInvoker::new(*timeout, *max_retries);
            let adapter: Arc<dyn Adapter> = match kind {
                AdapterKind::Ollama => Arc::new(OllamaAdapter::new(base_url.clone(), invoker)),
                AdapterKind::LmStudio => Arc::new(LmStudioAdapter::new(base_url.clone(), invoker)),
                AdapterKind::OpenRouter => Arc::new(OpenRouterAdapter::new(
                    base_url.clone(),
                    api_key.clone(),
                    headers.clone(),
                    invoker,
                )),
                _ => unreachable!(),
            };
            Ok(adapter)
        }
        (kind, _) => Err(CounselError::Config(format!(
            "adapter '{name}' is a {} adapter but was configured with the other type",
            if kind.is_cli() { "cli" } else { "http" }
        ))),
    }
}

/// Build the full adapter registry from configuration.
pub fn build_adapters(
    adapters: &std::collections::BTreeMap<String, AdapterConfig>,
) -> Result<HashMap<String, Arc<dyn Adapter>>> {
    let mut registry = HashMap::new();
    for (name, config) in adapters {
        registry.insert(name.clone(), create_adapter(name, config)?);
    }
    Ok(registry)
}
