//! Per-run gate in front of every provider call.
//!
//! A [`RunContext`] owns the run's [`RunBudget`] and shares the engine's cache
//! and providers. Each call goes through the same sequence: deadline check,
//! budget peek, cache lookup, budget consume, timed call, cache write. A cache
//! hit returns before the consume step and costs no budget.

use crate::budget::{ProviderClass, RunBudget};
use crate::cache::CacheGateway;
use crate::config::ProvidersConfig;
use crate::error::{CallError, ProviderError};
use crate::providers::{
    AnswerMode, AnswerRequest, AnswerResponse, CompletionRequest, CompletionResponse, ProviderSet,
    SearchRequest, SearchResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on a single call, per provider class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTimeouts {
    pub search: Duration,
    pub answer: Duration,
    pub deep_answer: Duration,
    pub language_model: Duration,
}

impl CallTimeouts {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self {
            search: config.timeout_for(ProviderClass::Search),
            answer: config.timeout_for(ProviderClass::Answer),
            deep_answer: Duration::from_secs(config.answer.deep_timeout_secs),
            language_model: config.timeout_for(ProviderClass::LanguageModel),
        }
    }
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self::from_config(&ProvidersConfig::default())
    }
}

pub struct RunContext {
    budget: RunBudget,
    cache: Arc<CacheGateway>,
    providers: ProviderSet,
    timeouts: CallTimeouts,
    cache_hits: AtomicUsize,
}

impl RunContext {
    pub fn new(
        budget: RunBudget,
        cache: Arc<CacheGateway>,
        providers: ProviderSet,
        timeouts: CallTimeouts,
    ) -> Self {
        Self {
            budget,
            cache,
            providers,
            timeouts,
            cache_hits: AtomicUsize::new(0),
        }
    }

    pub fn budget(&self) -> &RunBudget {
        &self.budget
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, CallError> {
        let provider = &self.providers.search;
        self.gated(ProviderClass::Search, request, self.timeouts.search, || {
            provider.search(request)
        })
        .await
    }

    pub async fn ask(&self, request: &AnswerRequest) -> Result<AnswerResponse, CallError> {
        let timeout = match request.mode {
            AnswerMode::DeepResearch => self.timeouts.deep_answer,
            _ => self.timeouts.answer,
        };
        let provider = &self.providers.answer;
        self.gated(ProviderClass::Answer, request, timeout, || provider.ask(request))
            .await
    }

    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, CallError> {
        let provider = &self.providers.language_model;
        self.gated(
            ProviderClass::LanguageModel,
            request,
            self.timeouts.language_model,
            || provider.complete(request),
        )
        .await
    }

    async fn gated<Req, Resp, F, Fut>(
        &self,
        class: ProviderClass,
        request: &Req,
        timeout: Duration,
        call: F,
    ) -> Result<Resp, CallError>
    where
        Req: Serialize,
        Resp: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Resp, ProviderError>>,
    {
        if self.budget.deadline_exceeded() {
            debug!(class = %class, "Skipping call, run deadline exceeded");
            return Err(CallError::DeadlineExceeded);
        }
        if !self.budget.has_remaining(class) {
            debug!(class = %class, "Skipping call, budget exhausted");
            return Err(CallError::BudgetExhausted(class));
        }

        if let Some(cached) = self.cache.fetch::<Req, Resp>(class, request).await {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }

        if !self.budget.try_consume(class) {
            debug!(class = %class, "Skipping call, budget exhausted");
            return Err(CallError::BudgetExhausted(class));
        }

        let limit = timeout.min(self.budget.time_remaining());
        match tokio::time::timeout(limit, call()).await {
            Ok(Ok(response)) => {
                self.cache.save(class, request, &response).await;
                Ok(response)
            }
            Ok(Err(e)) => {
                warn!(class = %class, error = %e, "Provider call failed");
                Err(CallError::Provider(e))
            }
            Err(_) => {
                let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                warn!(class = %class, timeout_ms, "Provider call timed out");
                Err(ProviderError::Timeout { class, timeout_ms }.into())
            }
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("budget", &self.budget)
            .field("providers", &self.providers)
            .field("cache_hits", &self.cache_hits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsCacheStore;
    use crate::config::{BudgetProfile, CacheBackend, CacheConfig};
    use crate::providers::{MockAnswerProvider, MockLanguageModel, MockSearchProvider, SearchHit};

    fn profile(search: usize) -> BudgetProfile {
        BudgetProfile {
            max_search_calls: search,
            max_answer_calls: 1,
            max_language_model_calls: 1,
            deadline_secs: 60,
            allow_premium_tier: false,
        }
    }

    fn context_with(
        search: Arc<MockSearchProvider>,
        budget: RunBudget,
        cache: Arc<CacheGateway>,
        timeouts: CallTimeouts,
    ) -> RunContext {
        let providers = ProviderSet::new(
            search,
            Arc::new(MockAnswerProvider::new()),
            Arc::new(MockLanguageModel::new()),
        );
        RunContext::new(budget, cache, providers, timeouts)
    }

    #[tokio::test]
    async fn test_budget_consumed_and_enforced() {
        let search = Arc::new(MockSearchProvider::with_hits(vec![SearchHit::new(
            "https://a.example",
        )]));
        let ctx = context_with(
            search.clone(),
            RunBudget::new(&profile(1)),
            Arc::new(CacheGateway::disabled()),
            CallTimeouts::default(),
        );

        assert!(ctx.search(&SearchRequest::new("one", 8)).await.is_ok());
        let err = ctx.search(&SearchRequest::new("two", 8)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::BudgetExhausted(ProviderClass::Search)
        ));
        assert_eq!(search.call_count(), 1);
        assert_eq!(ctx.budget().usage().search, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_costs_no_budget() {
        let cache = Arc::new(CacheGateway::in_memory());
        let search = Arc::new(MockSearchProvider::with_hits(vec![SearchHit::new(
            "https://a.example",
        )]));
        let request = SearchRequest::new("same", 8);

        let first = context_with(
            search.clone(),
            RunBudget::new(&profile(1)),
            cache.clone(),
            CallTimeouts::default(),
        );
        first.search(&request).await.unwrap();

        let second = context_with(
            search.clone(),
            RunBudget::new(&profile(1)),
            cache,
            CallTimeouts::default(),
        );
        let hit = second.search(&request).await.unwrap();
        assert_eq!(hit.hits[0].url, "https://a.example");
        assert_eq!(second.cache_hits(), 1);
        assert_eq!(second.budget().usage().search, 0);
        assert_eq!(search.call_count(), 1);
    }

    #[tokio::test]
    async fn test_zero_ceiling_skips_cache_and_provider() {
        let cache = Arc::new(CacheGateway::in_memory());
        let request = SearchRequest::new("cached", 8);
        cache.put(ProviderClass::Search, &request, &SearchResponse::default());

        let search = Arc::new(MockSearchProvider::new());
        let ctx = context_with(
            search.clone(),
            RunBudget::new(&profile(0)),
            cache,
            CallTimeouts::default(),
        );
        assert!(matches!(
            ctx.search(&request).await,
            Err(CallError::BudgetExhausted(_))
        ));
        assert_eq!(ctx.cache_hits(), 0);
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_deadline_blocks_calls() {
        let search = Arc::new(MockSearchProvider::new());
        let ctx = context_with(
            search.clone(),
            RunBudget::with_deadline(&profile(5), Duration::ZERO),
            Arc::new(CacheGateway::disabled()),
            CallTimeouts::default(),
        );
        assert!(matches!(
            ctx.search(&SearchRequest::new("q", 8)).await,
            Err(CallError::DeadlineExceeded)
        ));
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_against_budget() {
        let search = Arc::new(MockSearchProvider::new().with_delay(Duration::from_millis(200)));
        let timeouts = CallTimeouts {
            search: Duration::from_millis(10),
            ..CallTimeouts::default()
        };
        let ctx = context_with(
            search,
            RunBudget::new(&profile(2)),
            Arc::new(CacheGateway::disabled()),
            timeouts,
        );

        let err = ctx.search(&SearchRequest::new("slow", 8)).await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Provider(ProviderError::Timeout {
                class: ProviderClass::Search,
                ..
            })
        ));
        assert_eq!(ctx.budget().usage().search, 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = Arc::new(CacheGateway::in_memory());
        let ctx = context_with(
            Arc::new(MockSearchProvider::failing()),
            RunBudget::new(&profile(2)),
            cache.clone(),
            CallTimeouts::default(),
        );
        let request = SearchRequest::new("broken", 8);
        assert!(ctx.search(&request).await.is_err());
        assert!(
            cache
                .get::<_, SearchResponse>(ProviderClass::Search, &request)
                .is_none()
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_filesystem_cache_serves_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheGateway::new(
            Box::new(FsCacheStore::new(dir.path())),
            CacheConfig {
                backend: CacheBackend::Filesystem,
                ..CacheConfig::default()
            },
        ));
        let search = Arc::new(MockSearchProvider::with_hits(vec![SearchHit::new(
            "https://disk.example",
        )]));
        let request = SearchRequest::new("persisted", 8);

        for _ in 0..2 {
            let ctx = context_with(
                search.clone(),
                RunBudget::new(&profile(1)),
                cache.clone(),
                CallTimeouts::default(),
            );
            let response = ctx.search(&request).await.unwrap();
            assert_eq!(response.hits[0].url, "https://disk.example");
        }
        assert_eq!(search.call_count(), 1);
        assert_eq!(
            std::fs::read_dir(dir.path().join(ProviderClass::Search.as_str()))
                .unwrap()
                .count(),
            1
        );
    }
}
