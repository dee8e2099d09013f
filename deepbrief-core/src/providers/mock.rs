//! Scripted provider doubles.
//!
//! Each mock returns queued responses first, then its fixed fallback response.
//! A mock built with `failing()` errors on every call. Every call is counted
//! and its request recorded.

use super::{
    AnswerProvider, AnswerRequest, AnswerResponse, CompletionRequest, CompletionResponse,
    LanguageModel, SearchHit, SearchProvider, SearchRequest, SearchResponse,
};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Script<Req, Resp> {
    name: &'static str,
    queued: Mutex<VecDeque<Resp>>,
    fallback: Option<Resp>,
    failing: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Req>>,
}

impl<Req: Clone, Resp: Clone> Script<Req, Resp> {
    fn new(name: &'static str, fallback: Option<Resp>) -> Self {
        Self {
            name,
            queued: Mutex::new(VecDeque::new()),
            fallback,
            failing: false,
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn queue(&self, response: Resp) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(response);
    }

    fn recorded(&self) -> Vec<Req> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    async fn next(&self, request: &Req) -> Result<Resp, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(ProviderError::ApiRequest {
                provider: self.name.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        let queued = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        queued
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| ProviderError::ApiRequest {
                provider: self.name.to_string(),
                message: "no scripted response".to_string(),
            })
    }
}

macro_rules! scripted_builders {
    ($ty:ident, $resp:ty) => {
        impl $ty {
            /// A double that errors on every call.
            pub fn failing() -> Self {
                let mut mock = Self::new();
                mock.script.failing = true;
                mock
            }

            /// Sleep before answering, to exercise timeouts and deadlines.
            pub fn with_delay(mut self, delay: Duration) -> Self {
                self.script.delay = Some(delay);
                self
            }

            /// Queue a response for the next call.
            pub fn queue_response(&self, response: $resp) {
                self.script.queue(response);
            }

            pub fn call_count(&self) -> usize {
                self.script.calls.load(Ordering::SeqCst)
            }
        }
    };
}

pub struct MockSearchProvider {
    script: Script<SearchRequest, SearchResponse>,
}

impl MockSearchProvider {
    /// Returns no hits.
    pub fn new() -> Self {
        Self {
            script: Script::new("mock-search", Some(SearchResponse::default())),
        }
    }

    /// Returns the same hits on every call.
    pub fn with_hits(hits: Vec<SearchHit>) -> Self {
        Self {
            script: Script::new("mock-search", Some(SearchResponse { hits })),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.script.recorded()
    }
}

impl Default for MockSearchProvider {
    fn default() -> Self {
        Self::new()
    }
}

scripted_builders!(MockSearchProvider, SearchResponse);

#[async_trait]
impl SearchProvider for MockSearchProvider {
    fn name(&self) -> &str {
        self.script.name
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ProviderError> {
        self.script.next(request).await
    }
}

pub struct MockAnswerProvider {
    script: Script<AnswerRequest, AnswerResponse>,
}

impl MockAnswerProvider {
    /// Returns a short uncited answer.
    pub fn new() -> Self {
        Self::with_answer("Mock answer.", Vec::new())
    }

    /// Returns the same text and citations on every call.
    pub fn with_answer(text: &str, citations: Vec<String>) -> Self {
        Self {
            script: Script::new(
                "mock-answer",
                Some(AnswerResponse {
                    text: text.to_string(),
                    citations,
                }),
            ),
        }
    }

    pub fn requests(&self) -> Vec<AnswerRequest> {
        self.script.recorded()
    }
}

impl Default for MockAnswerProvider {
    fn default() -> Self {
        Self::new()
    }
}

scripted_builders!(MockAnswerProvider, AnswerResponse);

#[async_trait]
impl AnswerProvider for MockAnswerProvider {
    fn name(&self) -> &str {
        self.script.name
    }

    async fn ask(&self, request: &AnswerRequest) -> Result<AnswerResponse, ProviderError> {
        self.script.next(request).await
    }
}

pub struct MockLanguageModel {
    script: Script<CompletionRequest, CompletionResponse>,
}

impl MockLanguageModel {
    /// Returns prose with no structured payload, so every parse falls back.
    pub fn new() -> Self {
        Self::with_text("I'm a mock language model. No queued responses available.")
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            script: Script::new("mock-language-model", Some(CompletionResponse::text(text))),
        }
    }

    /// Queue a plain-text response.
    pub fn queue_text(&self, text: &str) {
        self.script.queue(CompletionResponse::text(text));
    }

    /// Queue a structured response.
    pub fn queue_object(&self, object: serde_json::Value) {
        self.script.queue(CompletionResponse::object(object));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.script.recorded()
    }
}

impl Default for MockLanguageModel {
    fn default() -> Self {
        Self::new()
    }
}

scripted_builders!(MockLanguageModel, CompletionResponse);

#[async_trait]
impl LanguageModel for MockLanguageModel {
    fn name(&self) -> &str {
        self.script.name
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        self.script.next(request).await
    }
}
