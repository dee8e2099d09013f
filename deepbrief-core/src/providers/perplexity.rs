//! Perplexity answer-engine client.
//!
//! Each [`AnswerMode`] maps to a model and a system prompt. Citations are read
//! from `choices[0].message.citations`, falling back to the top-level
//! `citations` array.

use super::{AnswerMode, AnswerProvider, AnswerRequest, AnswerResponse, api_key_from_env, post_json};
use crate::config::AnswerProviderConfig;
use crate::error::{ConfigError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const PROVIDER: &str = "perplexity";

pub struct PerplexityClient {
    client: Client,
    base_url: String,
    api_key: String,
    temperature: f32,
}

impl PerplexityClient {
    pub fn new(config: &AnswerProviderConfig) -> Result<Self, ConfigError> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &AnswerProviderConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: config.temperature,
        }
    }

    fn model_for(mode: AnswerMode) -> &'static str {
        match mode {
            AnswerMode::Default => "sonar",
            AnswerMode::Pro => "sonar-pro",
            AnswerMode::Reasoning => "sonar-reasoning",
            AnswerMode::DeepResearch => "sonar-deep-research",
        }
    }

    fn system_prompt_for(mode: AnswerMode) -> &'static str {
        match mode {
            AnswerMode::Default => "Be concise. Cite sources when possible.",
            AnswerMode::Pro => {
                "Be precise and thorough. Cite sources for every factual claim."
            }
            AnswerMode::Reasoning => {
                "You are a reasoning assistant. Think step-by-step and provide logical analysis. \
                 Cite sources when possible."
            }
            AnswerMode::DeepResearch => {
                "You are a deep research assistant. Conduct thorough analysis with multiple \
                 sources. Provide comprehensive insights with detailed citations."
            }
        }
    }

    fn request_body(&self, request: &AnswerRequest) -> Value {
        json!({
            "model": Self::model_for(request.mode),
            "messages": [
                { "role": "system", "content": Self::system_prompt_for(request.mode) },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": self.temperature,
            "return_citations": true,
        })
    }

    fn parse_response(body: &Value) -> Result<AnswerResponse, ProviderError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| ProviderError::ResponseParse {
                provider: PROVIDER.to_string(),
                message: "No message in response".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let citations = message
            .get("citations")
            .or_else(|| body.get("citations"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|c| c.as_str().or_else(|| c.get("url")?.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(AnswerResponse { text, citations })
    }
}

#[async_trait]
impl AnswerProvider for PerplexityClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn ask(&self, request: &AnswerRequest) -> Result<AnswerResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(url = %url, mode = request.mode.as_str(), "Sending answer request");
        let builder = self.client.post(&url).bearer_auth(&self.api_key);
        let body = post_json(PROVIDER, builder, &self.request_body(request)).await?;
        Self::parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_models() {
        assert_eq!(PerplexityClient::model_for(AnswerMode::Pro), "sonar-pro");
        assert_eq!(
            PerplexityClient::model_for(AnswerMode::DeepResearch),
            "sonar-deep-research"
        );
    }

    #[test]
    fn test_request_body() {
        let client = PerplexityClient::with_key(&AnswerProviderConfig::default(), "pplx".into());
        let body = client.request_body(&AnswerRequest::new("why?", AnswerMode::Reasoning));
        assert_eq!(body["model"], "sonar-reasoning");
        assert_eq!(body["messages"][1]["content"], "why?");
        assert_eq!(body["return_citations"], true);
    }

    #[test]
    fn test_citations_from_message() {
        let body = json!({
            "choices": [{"message": {"content": "text", "citations": ["https://a.example"]}}],
            "citations": ["https://ignored.example"]
        });
        let response = PerplexityClient::parse_response(&body).unwrap();
        assert_eq!(response.text, "text");
        assert_eq!(response.citations, vec!["https://a.example".to_string()]);
    }

    #[test]
    fn test_citations_from_top_level() {
        let body = json!({
            "choices": [{"message": {"content": "text"}}],
            "citations": ["https://b.example"]
        });
        let response = PerplexityClient::parse_response(&body).unwrap();
        assert_eq!(response.citations, vec!["https://b.example".to_string()]);
    }

    #[test]
    fn test_missing_choices_is_parse_error() {
        let err = PerplexityClient::parse_response(&json!({"error": "x"})).unwrap_err();
        assert!(matches!(err, ProviderError::ResponseParse { .. }));
    }
}
