//! Vector embeddings for comment-similarity matching.
//!
//! The similarity handler depends only on the [`EmbeddingProvider`] trait,
//! so tests can substitute a stub.  The production implementation calls an
//! OpenAI-compatible `/embeddings` endpoint; in offline mode (no API token)
//! a disabled provider stands in and every embedding request fails with a
//! clear message.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Seconds before an in-flight embeddings call is abandoned.
const EMBED_TIMEOUT_SECS: u64 = 30;

/// Embedding provider trait for generating vector embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate one embedding per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ── Remote provider ─────────────────────────────────────────────────────────

/// OpenAI-compatible `/embeddings` client.
pub struct RemoteEmbeddingProvider {
    api_token: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &Config) -> Result<Self> {
        let api_token = config
            .api_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no API token configured for embeddings"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_token,
            base_url: config.api_base.clone(),
            model: config.embedding_model.clone(),
            client,
        })
    }

    async fn call_api(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct EmbeddingRequest {
            model: String,
            input: Vec<String>,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let request = EmbeddingRequest { model: self.model.clone(), input: texts };

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to embeddings endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embeddings endpoint error {}: {}", status, body);
        }

        let response_data: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embeddings response")?;

        Ok(response_data.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.call_api(texts.to_vec()).await
    }

    fn name(&self) -> &str {
        "remote"
    }
}

// ── Disabled provider ───────────────────────────────────────────────────────

/// Stand-in used when no API token is configured.  Lets the rest of the
/// pipeline run offline; only the embeddings-backed operation fails.
pub struct DisabledEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for DisabledEmbeddingProvider {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        anyhow::bail!("embeddings are unavailable: no API token configured")
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_provider_requires_token() {
        let config = Config { api_token: None, ..Config::default() };
        assert!(RemoteEmbeddingProvider::new(&config).is_err());

        let config = Config { api_token: Some("sk-test".to_string()), ..Config::default() };
        let provider = RemoteEmbeddingProvider::new(&config).unwrap();
        assert_eq!(provider.name(), "remote");
    }

    #[tokio::test]
    async fn test_disabled_provider_always_fails() {
        let provider = DisabledEmbeddingProvider;
        let err = provider.embed_batch(&["a".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("no API token"));
    }
}
