// crates/counsel-server/src/adapters/error.rs
// Adapter failure taxonomy

use thiserror::Error;

/// Errors surfaced by backend adapters.
///
/// Every variant maps to a short sentinel recorded in the transcript
/// slot of the failing participant; a failed adapter never halts a
/// round.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("invocation timed out after {0}s")]
    Timeout(u64),

    /// Network failure, 5xx, or 429 after retries were exhausted.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Non-retryable failure: 4xx, subprocess error, malformed response.
    #[error("backend failure: {0}")]
    Fatal(String),

    #[error("prompt too long ({len} chars, limit {limit})")]
    PromptTooLong { len: usize, limit: usize },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("permission escalation exhausted: {0}")]
    PermissionExhausted(String),
}

impl AdapterError {
    /// Short sentinel embedded as `[ERROR: <sentinel>]` in round responses.
    pub fn sentinel(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TIMEOUT",
            Self::Transient(_) => "ADAPTER_TRANSIENT",
            Self::Fatal(_) => "ADAPTER_FATAL",
            Self::PromptTooLong { .. } => "PROMPT_TOO_LONG",
            Self::ModelNotFound(_) => "MODEL_NOT_FOUND",
            Self::PermissionExhausted(_) => "PERMISSION_EXHAUSTED",
        }
    }
}
