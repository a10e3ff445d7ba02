// crates/counsel-server/src/adapters/http.rs
// Shared HTTP invoker for API-backed adapters

use super::error::AdapterError;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Base backoff between retries (doubles each attempt).
const BASE_BACKOFF: Duration = Duration::from_secs(1);
/// Backoff ceiling.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Whether an HTTP status warrants a retry.
///
/// Retries on 5xx server errors and 429 rate limits. Never retries
/// other 4xx client errors.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Shared HTTP POST execution with retry for all HTTP adapters.
pub struct HttpInvoker {
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

impl HttpInvoker {
    pub fn new(timeout_secs: u64, max_retries: u32) -> Self {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            timeout,
            max_retries: max_retries.max(1),
        }
    }

    /// POST a JSON body and parse the JSON response.
    ///
    /// Retry policy: network-layer errors (connect, timeout, reset),
    /// 5xx, and 429 are retried with exponential backoff up to
    /// `max_retries` total attempts; other 4xx fail immediately with
    /// the response body logged at error level. A request that was
    /// still timing out on the last attempt surfaces as `Timeout`.
    pub async fn post_json(
        &self,
        request_id: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &Value,
    ) -> Result<Value, AdapterError> {
        let mut backoff = BASE_BACKOFF;
        let mut attempt = 1u32;

        loop {
            debug!(request_id = %request_id, url = %url, attempt, "HTTP request");
            let mut request = self.client.post(url).json(body);
            for (name, value) in headers {
                request = request.header(name, value);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response.text().await.map_err(|e| {
                            AdapterError::Fatal(format!("failed to read response body: {e}"))
                        })?;
                        return serde_json::from_str(&text).map_err(|e| {
                            AdapterError::Fatal(format!("invalid JSON response: {e}"))
                        });
                    }

                    let error_body = response.text().await.unwrap_or_default();
                    if is_retryable_status(status) {
                        if attempt < self.max_retries {
                            warn!(
                                request_id = %request_id,
                                status = %status,
                                "Transient HTTP error, retrying in {:?}",
                                backoff
                            );
                            tokio::time::sleep(backoff).await;
                            attempt += 1;
                            backoff = (backoff * 2).min(MAX_BACKOFF);
                            continue;
                        }
                        return Err(AdapterError::Transient(format!(
                            "HTTP {status} after {attempt} attempts: {error_body}"
                        )));
                    }

                    // 4xx (other than 429): log the body to aid diagnosis,
                    // never retry.
                    error!(
                        request_id = %request_id,
                        status = %status,
                        body = %error_body,
                        "HTTP client error response"
                    );
                    return Err(AdapterError::Fatal(format!(
                        "HTTP {status}: {error_body}"
                    )));
                }
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!(
                            request_id = %request_id,
                            error = %e,
                            "Network error, retrying in {:?}",
                            backoff
                        );
                        tokio::time::sleep(backoff).await;
                        attempt += 1;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                        continue;
                    }
                    if e.is_timeout() {
                        return Err(AdapterError::Timeout(self.timeout.as_secs()));
                    }
                    return Err(AdapterError::Transient(format!(
                        "request failed after {attempt} attempts: {e}"
                    )));
                }
            }
        }
    }
}

/// Extract `choices[0].message.content` from an OpenAI-compatible
/// chat-completions response.
pub fn extract_chat_content(response: &Value) -> Result<String, AdapterError> {
    let choices = response
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AdapterError::Fatal(format!(
                "response missing 'choices' field (keys: {})",
                top_level_keys(response)
            ))
        })?;
    let first = choices
        .first()
        .ok_or_else(|| AdapterError::Fatal("response has empty 'choices' array".into()))?;
    first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| AdapterError::Fatal("choice missing 'message.content' field".into()))
}

fn top_level_keys(value: &Value) -> String {
    match value.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(", "),
        None => "non-object".into(),
    }
}
