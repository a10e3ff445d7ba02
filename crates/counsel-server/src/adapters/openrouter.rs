// crates/counsel-server/src/adapters/openrouter.rs
// OpenRouter HTTP adapter (OpenAI-compatible hosted API)

use super::error::AdapterError;
use super::http::{HttpInvoker, extract_chat_content};
use super::subprocess::compose_prompt;
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Adapter for the OpenRouter hosted API.
///
/// Posts to `/chat/completions` with Bearer authentication. The header
/// is emitted even when no key was resolved; the server's rejection is
/// then observable in the 4xx error log.
pub struct OpenRouterAdapter {
    base_url: String,
    api_key: Option<String>,
    extra_headers: BTreeMap<String, String>,
    invoker: HttpInvoker,
}

impl OpenRouterAdapter {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        extra_headers: BTreeMap<String, String>,
        invoker: HttpInvoker,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            extra_headers,
            invoker,
        }
    }

    fn build_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        })
    }

    fn build_headers(&self) -> BTreeMap<String, String> {
        let mut headers = self.extra_headers.clone();
        headers.insert("Content-Type".into(), "application/json".into());
        headers.insert(
            "Authorization".into(),
            format!("Bearer {}", self.api_key.as_deref().unwrap_or_default()),
        );
        headers
    }
}

#[async_trait]
impl Adapter for OpenRouterAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(req.model, &full_prompt);

        let response = self
            .invoker
            .post_json(&request_id, &url, &self.build_headers(), &body)
            .await?;
        extract_chat_content(&response)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::OpenRouter
    }
}
