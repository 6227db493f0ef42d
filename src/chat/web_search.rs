//! C8 Web Search Tool (spec §4.8): a single best-effort HTTP call exposed to
//! C7 as the `internet_search` tool. No retry, no caching; failure degrades
//! to an empty result list rather than failing the turn.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::config::settings::WebSearchConfig;
use crate::error::{OrchestratorError, Result};

const SEARCH_DEADLINE: Duration = Duration::from_millis(8_000);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult>;
}

pub struct HttpWebSearchProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWebSearchProvider {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(SEARCH_DEADLINE)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn search_once(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        #[derive(Serialize)]
        struct Req<'a> {
            query: &'a str,
            max_results: usize,
        }
        #[derive(Deserialize)]
        struct Resp {
            results: Vec<SearchResult>,
        }

        let url = format!("{}/v1/search", self.base_url);
        let mut builder = self.client.post(&url).json(&Req { query, max_results });
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await.map_err(|e| {
            OrchestratorError::ProviderTransient(format!("web search request failed: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::ProviderPermanent(format!(
                "web search provider {status}: {body}"
            )));
        }

        let body: Resp = response
            .json()
            .await
            .map_err(|e| OrchestratorError::ProviderPermanent(format!("malformed search response: {e}")))?;

        Ok(body.results)
    }
}

#[async_trait]
impl WebSearchProvider for HttpWebSearchProvider {
    #[instrument(skip(self, query), fields(max_results))]
    async fn search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        match tokio::time::timeout(SEARCH_DEADLINE, self.search_once(query, max_results)).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => {
                e.log();
                Vec::new()
            }
            Err(_) => {
                warn!("web search missed its deadline");
                Vec::new()
            }
        }
    }
}
