// crates/counsel-server/src/adapters/lmstudio.rs
// LM Studio HTTP adapter (OpenAI-compatible local API)

use super::error::AdapterError;
use super::http::{HttpInvoker, extract_chat_content};
use super::subprocess::compose_prompt;
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

/// Adapter for the LM Studio local API.
///
/// Posts the OpenAI chat-completions shape to `/v1/chat/completions`
/// and extracts `choices[0].message.content`. No auth is required.
pub struct LmStudioAdapter {
    base_url: String,
    invoker: HttpInvoker,
}

impl LmStudioAdapter {
    pub fn new(base_url: String, invoker: HttpInvoker) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            invoker,
        }
    }

    fn build_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.7,
            "stream": false,
        })
    }
}

#[async_trait]
impl Adapter for LmStudioAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = Self::build_body(req.model, &full_prompt);
        let headers = std::collections::BTreeMap::from([(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]);

        let response = self
            .invoker
            .post_json(&request_id, &url, &headers, &body)
            .await?;
        extract_chat_content(&response)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::LmStudio
    }
}
