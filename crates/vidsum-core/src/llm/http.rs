//! HTTP-backed [`LlmClient`], grounded in `querymt::plugin::http`'s
//! `handle_http_error!` status-code mapping and the fixed-backoff retry loop
//! in `examples/original_source/openai.py`'s `chat`/`chat_sync`.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChatMessage, ChatRole, LlmClient};
use crate::config::{ModelTier, OrchestratorConfig};
use crate::error::LlmError;

/// Number of low-level connection attempts per outer retry attempt (spec.md
/// §4.5: "transport-level retries=2 inside each attempt").
const TRANSPORT_RETRIES: u32 = 2;

#[derive(Serialize)]
struct ChatRequestBody<'a> {
    messages: Vec<WireMessage<'a>>,
    model: &'a str,
    top_p: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// A chat client that POSTs to a single OpenAI-compatible chat-completions
/// endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    config: Arc<OrchestratorConfig>,
    default_api_key: Option<String>,
}

impl HttpLlmClient {
    pub fn new(config: Arc<OrchestratorConfig>, default_api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            default_api_key,
        }
    }

    fn resolve_api_key<'a>(&'a self, per_call: Option<&'a str>) -> Result<&'a str, LlmError> {
        per_call
            .or(self.default_api_key.as_deref())
            .ok_or_else(|| LlmError::InvalidRequest("no API key configured".to_string()))
    }

    /// A single attempt: up to `TRANSPORT_RETRIES + 1` raw sends to absorb
    /// connect failures, then one status-code interpretation pass.
    async fn send_once(
        &self,
        body: &ChatRequestBody<'_>,
        api_key: &str,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let mut last_connect_err: Option<LlmError> = None;

        for transport_attempt in 0..=TRANSPORT_RETRIES {
            let result = self
                .http
                .post(&self.config.llm_endpoint)
                .bearer_auth(api_key)
                .timeout(timeout)
                .json(body)
                .send()
                .await;

            let response = match result {
                Ok(r) => r,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    debug!(transport_attempt, "connect error, retrying transport");
                    last_connect_err = Some(LlmError::Connect(e.to_string()));
                    continue;
                }
                Err(e) => return Err(LlmError::Connect(e.to_string())),
            };

            return interpret_response(response).await;
        }

        Err(last_connect_err.unwrap_or_else(|| LlmError::Connect("unknown transport error".into())))
    }
}

async fn interpret_response(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    if status.is_success() {
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseFormat(e.to_string()))?;
        return extract_content(&body);
    }

    let status_code = status.as_u16();
    let retry_after_secs = if status_code == 429 {
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    } else {
        None
    };
    let body_text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body_text)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or(body_text);

    Err(match status_code {
        429 => LlmError::RateLimited {
            message,
            retry_after_secs,
        },
        400 => LlmError::InvalidRequest(message),
        502 | 500 | 503 => LlmError::Server {
            status: status_code,
            message,
        },
        _ => LlmError::Server {
            status: status_code,
            message,
        },
    })
}

/// Pulls `choices[0].message.content` out of an OpenAI-shaped response body
/// (mirrors `examples/original_source/openai.py`'s `get_content`).
fn extract_content(body: &serde_json::Value) -> Result<String, LlmError> {
    body.pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| LlmError::ResponseFormat("missing choices[0].message.content".to_string()))
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tier: ModelTier,
        top_p: f32,
        timeout: Duration,
        api_key: Option<&str>,
    ) -> Result<String, LlmError> {
        let api_key = self.resolve_api_key(api_key)?.to_string();
        let model = self.config.model_name(tier).to_string();

        let wire_messages: Vec<WireMessage<'_>> = messages
            .iter()
            .map(|m| WireMessage {
                role: role_str(m.role),
                content: &m.content,
            })
            .collect();
        let body = ChatRequestBody {
            messages: wire_messages,
            model: &model,
            top_p,
        };

        for attempt in 1..=self.config.retry_count {
            match self.send_once(&body, &api_key, timeout).await {
                Ok(content) => return Ok(content),
                Err(e) if !e.is_transient() => {
                    info!(attempt, error = %e, "LLM call failed with a non-retryable error");
                    return Err(e);
                }
                Err(e) if attempt < self.config.retry_count => {
                    warn!(attempt, retry_count = self.config.retry_count, error = %e, "retrying LLM call");
                    tokio::time::sleep(self.config.retry_wait).await;
                }
                Err(e) => {
                    info!(attempt, error = %e, "LLM call failed, retries exhausted");
                    return Err(LlmError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }

        unreachable!("retry_count is always >= 1, so the loop above always returns")
    }
}

fn role_str(role: ChatRole) -> &'static str {
    role.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(endpoint: String) -> Arc<OrchestratorConfig> {
        Arc::new(
            OrchestratorConfig::builder()
                .llm_endpoint(endpoint)
                .retry(3, Duration::from_millis(1))
                .build(),
        )
    }

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "hello"}}]
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(config_for(server.uri()), Some("key".into()));
        let out = client
            .chat(
                &[ChatMessage::user("hi")],
                ModelTier::Small,
                0.1,
                Duration::from_secs(5),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn retries_on_429_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(config_for(server.uri()), Some("key".into()));
        let out = client
            .chat(
                &[ChatMessage::user("hi")],
                ModelTier::Small,
                0.1,
                Duration::from_secs(5),
                None,
            )
            .await
            .unwrap();
        assert_eq!(out, "ok");
    }

    #[tokio::test]
    async fn exhausts_retries_on_persistent_502() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(config_for(server.uri()), Some("key".into()));
        let err = client
            .chat(
                &[ChatMessage::user("hi")],
                ModelTier::Small,
                0.1,
                Duration::from_secs(5),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { .. }));
    }

    #[tokio::test]
    async fn does_not_retry_on_400() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "bad request"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(config_for(server.uri()), Some("key".into()));
        let err = client
            .chat(
                &[ChatMessage::user("hi")],
                ModelTier::Small,
                0.1,
                Duration::from_secs(5),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest(_)));
    }
}
