//! OpenRouter chat-completions client with optional JSON-schema output.

use super::{
    ChatMessage, CompletionRequest, CompletionResponse, LanguageModel, api_key_from_env, post_json,
};
use crate::config::LanguageModelConfig;
use crate::error::{ConfigError, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

const PROVIDER: &str = "openrouter";

pub struct OpenRouterClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    referer: Option<String>,
    app_title: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: &LanguageModelConfig) -> Result<Self, ConfigError> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self::with_key(config, api_key))
    }

    pub fn with_key(config: &LanguageModelConfig, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            referer: config.referer.clone(),
            app_title: config.app_title.clone(),
        }
    }

    fn request_body(&self, request: &CompletionRequest) -> Value {
        let messages: &[ChatMessage] = &request.messages;
        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
            "temperature": request.temperature,
        });
        if let Some(schema) = &request.schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "schema": schema,
                    "strict": true,
                }
            });
        }
        body
    }

    fn parse_response(body: &Value, wants_object: bool) -> Result<CompletionResponse, ProviderError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| ProviderError::ResponseParse {
                provider: PROVIDER.to_string(),
                message: "No choices in response".to_string(),
            })?;

        let text = message
            .get("content")
            .and_then(Value::as_str)
            .map(str::to_string);

        let object = if wants_object {
            text.as_deref()
                .and_then(|t| serde_json::from_str::<Value>(t).ok())
                .or_else(|| message.get("parsed").filter(|p| !p.is_null()).cloned())
        } else {
            None
        };

        Ok(CompletionResponse { text, object })
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            url = %url,
            model = request.model.as_deref().unwrap_or(&self.model),
            structured = request.schema.is_some(),
            "Sending completion request"
        );

        let mut builder = self.client.post(&url).bearer_auth(&self.api_key);
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.app_title {
            builder = builder.header("X-Title", title);
        }

        let body = post_json(PROVIDER, builder, &self.request_body(request)).await?;
        Self::parse_response(&body, request.schema.is_some())
    }
}
