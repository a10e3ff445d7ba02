// tests/support/mod.rs
// Scripted mock adapter and fixtures for engine integration tests

use async_trait::async_trait;
use counsel::adapters::{Adapter, AdapterError, AdapterKind, InvokeRequest};
use counsel::config::CounselConfig;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted reply for a mock invocation.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Transient backend failure.
    Transient(String),
    /// Non-retryable backend failure.
    Fatal(String),
    /// Never completes; exercises the engine's round timeout.
    Hang,
}

/// Adapter whose replies are scripted per model, consumed in order.
/// When a model's script runs dry, a bland fallback reply is returned
/// (this also serves the summarizer's extra invocation).
pub struct MockAdapter {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    fallback: String,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: "No further comment.".to_string(),
        }
    }

    pub fn script(self, model: &str, replies: Vec<MockReply>) -> Self {
        self.scripts
            .lock()
            .expect("mock scripts lock")
            .insert(model.to_string(), replies.into());
        self
    }

    pub fn texts(self, model: &str, replies: &[&str]) -> Self {
        self.script(
            model,
            replies.iter().map(|t| MockReply::Text(t.to_string())).collect(),
        )
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let reply = self
            .scripts
            .lock()
            .expect("mock scripts lock")
            .get_mut(req.model)
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Transient(msg)) => Err(AdapterError::Transient(msg)),
            Some(MockReply::Fatal(msg)) => Err(AdapterError::Fatal(msg)),
            Some(MockReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
            None => Ok(self.fallback.clone()),
        }
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Codex
    }
}

/// Engine config with transcripts under a temp dir and short timeouts.
pub fn test_config(transcripts_dir: &std::path::Path) -> CounselConfig {
    let mut config = CounselConfig::default();
    config.storage.transcripts_dir = transcripts_dir.to_string_lossy().into_owned();
    config.defaults.timeout_per_round = 2;
    config
}

/// A response body ending in a vote line.
pub fn voted_response(position: &str, option: &str, confidence: f64, continue_debate: bool) -> String {
    format!(
        "{position}\n\nVOTE: {{\"option\": \"{option}\", \"confidence\": {confidence}, \
         \"rationale\": \"{position}\", \"continue_debate\": {continue_debate}}}"
    )
}

/// A summarizer reply with all canonical sections filled in.
pub fn summary_reply(consensus: &str) -> String {
    format!(
        "CONSENSUS:\n{consensus}\n\n\
         KEY AGREEMENTS:\n- Shared direction\n\n\
         KEY DISAGREEMENTS:\n- None\n\n\
         FINAL RECOMMENDATION:\nProceed as agreed."
    )
}
