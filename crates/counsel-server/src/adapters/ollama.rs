// crates/counsel-server/src/adapters/ollama.rs
// Ollama HTTP adapter (generate-style local API)

use super::error::AdapterError;
use super::http::HttpInvoker;
use super::subprocess::compose_prompt;
use super::{Adapter, AdapterKind, InvokeRequest};
use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

/// Adapter for the Ollama local inference API.
///
/// Posts to `/api/generate` with `stream: false` and reads the
/// `response` field.
pub struct OllamaAdapter {
    base_url: String,
    invoker: HttpInvoker,
}

impl OllamaAdapter {
    pub fn new(base_url: String, invoker: HttpInvoker) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            invoker,
        }
    }

    fn build_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
        })
    }

    fn parse_response(response: &Value) -> Result<String, AdapterError> {
        response
            .get("response")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or_else(|| {
                let keys = response
                    .as_object()
                    .map(|o| o.keys().cloned().collect::<Vec<_>>().join(", "))
                    .unwrap_or_else(|| "non-object".into());
                AdapterError::Fatal(format!(
                    "response missing 'response' field (keys: {keys})"
                ))
            })
    }
}

#[async_trait]
impl Adapter for OllamaAdapter {
    async fn invoke(&self, req: InvokeRequest<'_>) -> Result<String, AdapterError> {
        let full_prompt = compose_prompt(req.context, req.prompt);
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{}/api/generate", self.base_url);
        let body = Self::build_body(req.model, &full_prompt);
        let headers = std::collections::BTreeMap::from([(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )]);

        let response = self
            .invoker
            .post_json(&request_id, &url, &headers, &body)
            .await?;
        Self::parse_response(&response)
    }

    fn kind(&self) -> AdapterKind {
        AdapterKind::Ollama
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let adapter = OllamaAdapter::new(
            "http://localhost:11434/".into(),
            HttpInvoker::new(10, 3),
        );
        assert_eq!(adapter.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_build_body() {
        let body = OllamaAdapter::build_body("llama3.3", "What is 2+2?");
        assert_eq!(body["model"], "llama3.3");
        assert_eq!(body["prompt"], "What is 2+2?");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn test_parse_response() {
        let response = serde_json::json!({
            "model": "llama3.3",
            "response": "The answer is 4.",
            "done": true
        });
        assert_eq!(
            OllamaAdapter::parse_response(&response).unwrap(),
            "The answer is 4."
        );
    }

    #[test]
    fn test_parse_response_missing_field() {
        let response = serde_json::json!({"model": "llama3.3", "done": true});
        let err = OllamaAdapter::parse_response(&response).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("'response'"));
        assert!(msg.contains("model"));
    }
}
