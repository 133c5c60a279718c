//! OpenAI embedding provider.
//!
//! Implements [`notefeed_core::embedding::EmbeddingProvider`] over the
//! `POST {base_url}/embeddings` endpoint. One text per call, no retries:
//! callers go through [`EmbeddingGenerator`](notefeed_core::embedding::EmbeddingGenerator),
//! which turns any failure into `None`.
//!
//! # Provider Selection
//!
//! [`create_provider`] returns `None` when the provider is `"disabled"` or
//! when its API key is missing from the environment; the capability is then
//! unavailable for the lifetime of the process.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use notefeed_core::embedding::EmbeddingProvider;
use notefeed_core::ProviderError;

use crate::config::{EmbeddingConfig, Secrets};

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        if config.dims == 0 {
            bail!("embedding.dims must be > 0 for the OpenAI provider");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        parse_openai_response(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<f32>, ProviderError> {
    let embedding = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .and_then(|item| item.get("embedding"))
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing data[0].embedding".to_string())
        })?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| ProviderError::InvalidResponse("non-numeric embedding value".into()))
        })
        .collect()
}

/// Build the configured embedding provider, or `None` when unavailable.
pub fn create_provider(
    config: &EmbeddingConfig,
    secrets: &Secrets,
) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "openai" => match &secrets.embedding_api_key {
            Some(key) => Ok(Some(Arc::new(OpenAIProvider::new(config, key.clone())?))),
            None => {
                tracing::warn!(
                    env = %config.api_key_env,
                    "embedding API key not set; embeddings disabled"
                );
                Ok(None)
            }
        },
        other => bail!("Unknown embedding provider: {}", other),
    }
}
