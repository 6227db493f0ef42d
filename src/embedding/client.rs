use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::settings::EmbeddingConfig;
use crate::error::{OrchestratorError, Result};
use crate::utils::backoff::{retry_transient, DEFAULT_ATTEMPTS, DEFAULT_BASE};
use crate::utils::limiters::{EmbeddingRateLimiter, Limiters};

/// Truncation policy from spec §4.1: callers must not depend on truncation
/// preserving meaning of extremely long inputs.
const MAX_INPUT_CHARS: usize = 8_000;

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    input: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Turns text into a fixed-dimension vector (C1). Safe for concurrent use;
/// no internal caching — callers that want caching (e.g. repeated identical
/// queries within a turn) layer it on top. `user_id` feeds the per-user rate
/// limiter; it plays no role in the embedding itself.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, user_id: i64, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, user_id: i64, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    limiters: Arc<Limiters>,
    rate_limiter: EmbeddingRateLimiter,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig, limiters: Arc<Limiters>, rate_per_minute: u32) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            dim: config.dim,
            limiters,
            rate_limiter: EmbeddingRateLimiter::new(rate_per_minute),
        }
    }

    fn prepare_input(text: &str) -> String {
        let trimmed = text.trim();
        if trimmed.chars().count() > MAX_INPUT_CHARS {
            trimmed.chars().rev().take(MAX_INPUT_CHARS).collect::<Vec<_>>().into_iter().rev().collect()
        } else {
            trimmed.to_string()
        }
    }

    async fn embed_once(&self, user_id: i64, text: &str) -> Result<Vec<f32>> {
        if !self.rate_limiter.try_acquire(user_id) {
            return Err(OrchestratorError::ProviderTransient(format!(
                "embedding rate limit exceeded for user_id={user_id}"
            ))
            .log());
        }

        let (_permit, wait) = Limiters::acquire_timed(
            self.limiters.embedding.clone(),
            self.limiters.acquire_timeout,
            "embedding",
        )
        .await?;
        debug!(wait_ms = wait.as_millis() as u64, op = "embedding", "wait_queue");

        let input = Self::prepare_input(text);
        let request = EmbeddingRequest {
            input,
            model: self.model.clone(),
        };
        let url = format!("{}/v1/embeddings", self.base_url);

        let mut request_builder = self.client.post(&url);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = request_builder.json(&request).send().await.map_err(|e| {
            OrchestratorError::ProviderTransient(format!("embedding request failed: {e}")).log()
        })?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ProviderTransient(format!(
                "embedding provider {status}: {body}"
            ))
            .log());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                OrchestratorError::ProviderPermanent(format!("embedding provider {status}: {body}"))
                    .log(),
            );
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            OrchestratorError::ProviderPermanent(format!("malformed embedding response: {e}")).log()
        })?;

        let embedding = body
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                OrchestratorError::ProviderPermanent("empty data array from embedding provider".into())
                    .log()
            })?;

        if embedding.is_empty() {
            return Err(OrchestratorError::ProviderPermanent("empty embedding vector".into()).log());
        }
        if embedding.len() != self.dim {
            return Err(OrchestratorError::Invariant(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dim,
                embedding.len()
            ))
            .log());
        }

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    #[instrument(skip(self, text), fields(chars = text.len()))]
    async fn embed(&self, user_id: i64, text: &str) -> Result<Vec<f32>> {
        retry_transient(DEFAULT_ATTEMPTS, DEFAULT_BASE, || self.embed_once(user_id, text)).await
    }

    #[instrument(skip(self, texts), fields(count = texts.len()))]
    async fn embed_batch(&self, user_id: i64, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use futures::future::try_join_all;
        try_join_all(texts.iter().map(|t| self.embed(user_id, t))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_long_input_to_last_8000_chars() {
        let long = "a".repeat(9000);
        let prepared = HttpEmbeddingClient::prepare_input(&long);
        assert_eq!(prepared.chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn leaves_short_input_untouched() {
        let short = "  hello world  ";
        assert_eq!(HttpEmbeddingClient::prepare_input(short), "hello world");
    }
}
