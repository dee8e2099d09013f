//! Knowledge provider contracts and implementations.
//!
//! The pipeline talks to three classes of provider through these traits:
//! - [`SearchProvider`]: web search returning URL/title/snippet/date hits
//! - [`AnswerProvider`]: an answer engine returning prose plus citation URLs
//! - [`LanguageModel`]: a chat-completion call with optional structured output
//!
//! HTTP implementations live in [`tavily`], [`perplexity`] and [`openrouter`];
//! scripted doubles for tests live in [`mock`]. Use [`ProviderSet::from_config`]
//! to build the HTTP set from configuration.

pub mod mock;
pub mod openrouter;
pub mod perplexity;
pub mod tavily;

use crate::config::ProvidersConfig;
use crate::error::{ConfigError, DeepBriefError, ProviderError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub use mock::{MockAnswerProvider, MockLanguageModel, MockSearchProvider};
pub use openrouter::OpenRouterClient;
pub use perplexity::PerplexityClient;
pub use tavily::TavilyClient;

/// Maximum characters sent as a search query.
pub const MAX_SEARCH_QUERY_CHARS: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    #[default]
    Basic,
    Advanced,
}

/// A web search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub depth: SearchDepth,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

impl SearchRequest {
    /// A basic-depth request; the query is truncated on a char boundary.
    pub fn new(query: &str, max_results: usize) -> Self {
        Self {
            query: query.chars().take(MAX_SEARCH_QUERY_CHARS).collect(),
            max_results,
            time_range: None,
            depth: SearchDepth::Basic,
            include_domains: Vec::new(),
            exclude_domains: Vec::new(),
        }
    }

    pub fn with_time_range(mut self, range: Option<TimeRange>) -> Self {
        self.time_range = range;
        self
    }

    pub fn with_include_domains(mut self, domains: Vec<String>) -> Self {
        self.include_domains = domains;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl SearchHit {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            snippet: None,
            published: None,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn published(mut self, date: impl Into<String>) -> Self {
        self.published = Some(date.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
}

/// Cost/quality tier of an answer call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnswerMode {
    Default,
    #[default]
    Pro,
    Reasoning,
    /// Premium tier, minutes per call.
    DeepResearch,
}

impl AnswerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AnswerMode::Default => "default",
            AnswerMode::Pro => "pro",
            AnswerMode::Reasoning => "reasoning",
            AnswerMode::DeepResearch => "deep-research",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub prompt: String,
    pub mode: AnswerMode,
}

impl AnswerRequest {
    pub fn new(prompt: impl Into<String>, mode: AnswerMode) -> Self {
        Self {
            prompt: prompt.into(),
            mode,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub text: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A language-model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    /// JSON schema for structured output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    pub temperature: f32,
    /// Model override; the client's configured model when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>, temperature: f32) -> Self {
        Self {
            messages,
            schema: None,
            temperature,
            model: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Parsed structured output, when a schema was supplied and honored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Value>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            object: None,
        }
    }

    pub fn object(object: Value) -> Self {
        Self {
            text: Some(object.to_string()),
            object: Some(object),
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError>;
}

#[async_trait]
pub trait AnswerProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn ask(&self, request: &AnswerRequest) -> Result<AnswerResponse, ProviderError>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;
}

/// The three providers a run calls through.
#[derive(Clone)]
pub struct ProviderSet {
    pub search: Arc<dyn SearchProvider>,
    pub answer: Arc<dyn AnswerProvider>,
    pub language_model: Arc<dyn LanguageModel>,
}

impl ProviderSet {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        answer: Arc<dyn AnswerProvider>,
        language_model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            search,
            answer,
            language_model,
        }
    }

    /// Build the HTTP clients. Fails when an API key variable is unset.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self, DeepBriefError> {
        Ok(Self {
            search: Arc::new(TavilyClient::new(&config.search)?),
            answer: Arc::new(PerplexityClient::new(&config.answer)?),
            language_model: Arc::new(OpenRouterClient::new(&config.language_model)?),
        })
    }
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet")
            .field("search", &self.search.name())
            .field("answer", &self.answer.name())
            .field("language_model", &self.language_model.name())
            .finish()
    }
}

/// Read an API key from the named environment variable.
pub(crate) fn api_key_from_env(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .ok_or_else(|| ConfigError::EnvVarMissing {
            var: var.to_string(),
        })
}

/// Map a non-success HTTP status to a provider error.
pub(crate) fn map_http_error(provider: &str, status: reqwest::StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        401 | 403 => {
            debug!(provider, body = %body, "Authentication failed");
            ProviderError::AuthFailed {
                provider: provider.to_string(),
            }
        }
        429 => {
            // "Rate limit reached ... try again in 20s"
            let retry_after_secs = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|v| v.get("error")?.get("message")?.as_str().map(str::to_string))
                .and_then(|msg| {
                    msg.split("in ")
                        .last()
                        .and_then(|s| s.trim().trim_end_matches('s').parse::<u64>().ok())
                })
                .unwrap_or(5);
            ProviderError::RateLimited {
                provider: provider.to_string(),
                retry_after_secs,
            }
        }
        code => ProviderError::Http {
            provider: provider.to_string(),
            status: code,
            body: truncate_body(body),
        },
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 500;
    if body.chars().count() <= MAX {
        body.to_string()
    } else {
        let mut out: String = body.chars().take(MAX).collect();
        out.push_str("...");
        out
    }
}

/// POST a JSON body and return the decoded JSON response.
pub(crate) async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, ProviderError> {
    let response = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ProviderError::ApiRequest {
            provider: provider.to_string(),
            message: format!("Request failed: {e}"),
        })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| ProviderError::ApiRequest {
        provider: provider.to_string(),
        message: format!("Failed to read response body: {e}"),
    })?;

    if !status.is_success() {
        return Err(map_http_error(provider, status, &text));
    }

    serde_json::from_str(&text).map_err(|e| ProviderError::ResponseParse {
        provider: provider.to_string(),
        message: format!("Invalid JSON: {e}"),
    })
}
