//! Tavily web search client.

use super::{SearchHit, SearchProvider, SearchRequest, SearchResponse, api_key_from_env, post_json};
use crate::config::SearchProviderConfig;
use crate::error::{ConfigError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const PROVIDER: &str = "tavily";

pub struct TavilyClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl TavilyClient {
    /// Create a client, reading the API key from `config.api_key_env`.
    pub fn new(config: &SearchProviderConfig) -> Result<Self, ConfigError> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &SearchProviderConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request_body(&self, request: &SearchRequest) -> Value {
        let mut body = json!({
            "api_key": self.api_key,
            "query": request.query,
            "max_results": request.max_results,
            "search_depth": request.depth,
            "include_raw_content": false,
        });
        if let Some(range) = request.time_range {
            body["time_range"] = json!(range);
        }
        if !request.include_domains.is_empty() {
            body["include_domains"] = json!(request.include_domains);
        }
        if !request.exclude_domains.is_empty() {
            body["exclude_domains"] = json!(request.exclude_domains);
        }
        body
    }

    fn parse_response(body: &Value) -> SearchResponse {
        let hits = body
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| {
                        let url = r.get("url")?.as_str()?.trim();
                        if url.is_empty() {
                            return None;
                        }
                        let field = |name: &str| r.get(name).and_then(Value::as_str).map(str::to_string);
                        Some(SearchHit {
                            url: url.to_string(),
                            title: field("title"),
                            snippet: field("content"),
                            published: field("published_date"),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        SearchResponse { hits }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        let url = format!("{}/search", self.base_url);
        debug!(url = %url, query = %request.query, "Sending search request");
        let body = post_json(PROVIDER, self.client.post(&url), &self.request_body(request)).await?;
        Ok(Self::parse_response(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TimeRange;

    fn client() -> TavilyClient {
        TavilyClient::with_key(&SearchProviderConfig::default(), "tvly-test".into())
    }

    #[test]
    fn test_request_body() {
        let req = SearchRequest::new("solid-state batteries", 8).with_time_range(Some(TimeRange::Year));
        let body = client().request_body(&req);
        assert_eq!(body["query"], "solid-state batteries");
        assert_eq!(body["max_results"], 8);
        assert_eq!(body["search_depth"], "basic");
        assert_eq!(body["time_range"], "year");
        assert!(body.get("include_domains").is_none());
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "results": [
                {"url": "https://a.example/x", "title": "A", "content": "snippet", "published_date": "2024-05-01"},
                {"url": "", "title": "empty"},
                {"title": "no url"},
                {"url": "https://b.example"}
            ]
        });
        let response = TavilyClient::parse_response(&body);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.hits[0].snippet.as_deref(), Some("snippet"));
        assert_eq!(response.hits[0].published.as_deref(), Some("2024-05-01"));
        assert_eq!(response.hits[1].title, None);
    }

    #[test]
    fn test_parse_response_without_results() {
        assert!(TavilyClient::parse_response(&json!({})).hits.is_empty());
    }
}
