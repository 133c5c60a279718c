//! Anthropic Messages API completion provider.
//!
//! Implements [`notefeed_core::completion::CompletionProvider`] with a single
//! non-streaming `POST {base_url}/messages` call. Authentication and version
//! headers are installed as client defaults.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use notefeed_core::completion::{ChatMessage, CompletionProvider};
use notefeed_core::ProviderError;

use crate::config::{CompletionConfig, Secrets};

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

pub struct AnthropicProvider {
    client: reqwest::Client,
    model: String,
    max_tokens: u32,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(config: &CompletionConfig, api_key: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key).context("invalid API key header value")?,
        );
        headers.insert(
            "anthropic-version",
            HeaderValue::from_str(&config.api_version)
                .context("invalid API version header value")?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: Option<&str>,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let request = MessageRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        tracing::debug!(status = %status, "completion response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: MessageResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ProviderError::InvalidResponse("no text content block".into()))
    }
}

/// Build the configured completion provider, or `None` when unavailable.
pub fn create_provider(
    config: &CompletionConfig,
    secrets: &Secrets,
) -> Result<Option<Arc<dyn CompletionProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "anthropic" => match &secrets.completion_api_key {
            Some(key) => Ok(Some(Arc::new(AnthropicProvider::new(config, key)?))),
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "completion API key not set; AI features disabled"
                );
                Ok(None)
            }
        },
        other => bail!("Unknown completion provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_provider(base_url: &str) -> AnthropicProvider {
        let config = CompletionConfig {
            provider: "anthropic".into(),
            base_url: base_url.to_string(),
            ..CompletionConfig::default()
        };
        AnthropicProvider::new(&config, "test-key").unwrap()
    }

    fn text_response(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "model": "claude-3-5-sonnet-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        })
    }

    #[tokio::test]
    async fn test_complete_sends_headers_and_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", "2023-06-01"))
            .and(body_partial_json(serde_json::json!({
                "system": "be brief",
                "messages": [{"role": "user", "content": "hi"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("hello")))
            .expect(1)
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let reply = provider
            .complete(Some("be brief"), &[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn test_complete_omits_absent_system() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("ok")))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        provider
            .complete(None, &[ChatMessage::user("hi")])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("system").is_none());
        assert_eq!(body["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let err = provider
            .complete(None, &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 529, .. }));
    }

    #[tokio::test]
    async fn test_complete_without_text_block() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"content": []})),
            )
            .mount(&server)
            .await;

        let provider = test_provider(&server.uri());
        let err = provider
            .complete(None, &[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn test_create_provider_requires_key() {
        let config = CompletionConfig {
            provider: "anthropic".into(),
            ..CompletionConfig::default()
        };
        assert!(create_provider(&config, &Secrets::default())
            .unwrap()
            .is_none());

        let secrets = Secrets {
            completion_api_key: Some("k".into()),
            ..Secrets::default()
        };
        assert!(create_provider(&config, &secrets).unwrap().is_some());

        let unknown = CompletionConfig {
            provider: "mystery".into(),
            ..CompletionConfig::default()
        };
        assert!(create_provider(&unknown, &secrets).is_err());
    }
}
