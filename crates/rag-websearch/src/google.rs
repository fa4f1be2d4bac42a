//! Google Programmable Search (Custom Search JSON API) client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use rag_types::WebSearchSettings;

use crate::{WebResult, WebSearch, WebSearchError};

/// The API returns at most 10 results per request.
const MAX_RESULTS_PER_REQUEST: usize = 10;

/// Configuration for the Google search client.
#[derive(Debug, Clone)]
pub struct GoogleSearchConfig {
    pub api_key: Option<SecretString>,

    /// Programmable Search engine id ("cx")
    pub engine_id: Option<String>,

    pub base_url: String,

    pub timeout: Duration,
}

impl GoogleSearchConfig {
    pub fn new(api_key: impl Into<String>, engine_id: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            engine_id: Some(engine_id.into()),
            base_url: "https://www.googleapis.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_settings(settings: &WebSearchSettings) -> Self {
        Self {
            api_key: settings.api_key.clone().map(SecretString::from),
            engine_id: settings.engine_id.clone(),
            base_url: settings.base_url.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Option<Vec<SearchItem>>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

/// Custom Search JSON API client.
pub struct GoogleSearchClient {
    config: GoogleSearchConfig,
    http_client: Client,
}

impl GoogleSearchClient {
    pub fn new(config: GoogleSearchConfig) -> Result<Self, WebSearchError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WebSearchError::Config(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// True when both the key and the engine id are configured.
    pub fn has_credentials(&self) -> bool {
        self.config.api_key.is_some() && self.config.engine_id.is_some()
    }
}

#[async_trait]
impl WebSearch for GoogleSearchClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<WebResult>, WebSearchError> {
        let (Some(api_key), Some(engine_id)) = (&self.config.api_key, &self.config.engine_id)
        else {
            return Err(WebSearchError::MissingCredentials);
        };

        let num = limit.clamp(1, MAX_RESULTS_PER_REQUEST);
        let url = format!("{}/customsearch/v1", self.config.base_url);
        debug!(query = %query, num, "Executing web search");

        let response = self
            .http_client
            .get(&url)
            .query(&[
                ("key", api_key.expose_secret()),
                ("cx", engine_id.as_str()),
                ("q", query),
                ("num", num.to_string().as_str()),
            ])
            .send()
            .await
            // the request URL carries the API key
            .map_err(|e| WebSearchError::Unavailable(e.without_url().to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                return Err(WebSearchError::MissingCredentials);
            }
            return Err(WebSearchError::Unavailable(format!(
                "Search API error {}: {}",
                status, error_text
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| WebSearchError::Malformed(e.without_url().to_string()))?;

        let items = body.items.unwrap_or_default();
        let mut results = Vec::with_capacity(items.len().min(num));
        for (i, item) in items.into_iter().take(num).enumerate() {
            let link = item
                .link
                .ok_or_else(|| WebSearchError::Malformed(format!("item {} has no link", i)))?;
            results.push(WebResult {
                title: item.title.unwrap_or_default(),
                snippet: item.snippet.unwrap_or_default(),
                link,
            });
        }

        debug!(count = results.len(), "Web search returned results");
        Ok(results)
    }

    fn provider_name(&self) -> &str {
        "google"
    }
}
