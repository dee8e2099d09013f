//! Budgeted evidence gathering across themes.
//!
//! Fact themes issue one search call. Knowledge and reasoning themes issue one
//! answer call, then a follow-up search whose hits lend title, snippet and
//! date to the cited URLs when host names match. Themes run concurrently and
//! fail independently.

use super::context::RunContext;
use super::session::ResearchCallback;
use crate::error::CallError;
use crate::providers::{AnswerMode, AnswerRequest, SearchHit, SearchRequest, TimeRange};
use crate::types::{Evidence, ResearchQuery, RetrievalStrategy, SourceTool, Theme, normalize_host};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Citation URLs taken from one answer.
pub const MAX_CITATIONS_PER_ANSWER: usize = 6;

pub struct EvidenceGatherer {
    max_results: usize,
}

impl EvidenceGatherer {
    pub fn new(max_results: usize) -> Self {
        Self { max_results }
    }

    /// Gather evidence for every theme. Never fails; failed themes contribute nothing.
    pub async fn gather(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        themes: &[Theme],
        callback: &dyn ResearchCallback,
    ) -> Vec<Evidence> {
        let tasks = themes.iter().map(|theme| async move {
            let evidence = self.gather_theme(ctx, query, theme).await;
            callback.on_theme_complete(&theme.question, evidence.len());
            evidence
        });

        let evidence: Vec<Evidence> = join_all(tasks).await.into_iter().flatten().collect();
        info!(themes = themes.len(), evidence = evidence.len(), "Evidence gathered");
        evidence
    }

    async fn gather_theme(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        theme: &Theme,
    ) -> Vec<Evidence> {
        match theme.strategy {
            RetrievalStrategy::Fact => self.search_theme(ctx, query, theme).await,
            RetrievalStrategy::Knowledge | RetrievalStrategy::Reasoning => {
                self.answer_theme(ctx, query, theme).await
            }
        }
    }

    fn time_range(query: &ResearchQuery) -> Option<TimeRange> {
        (!query.window.is_unbounded()).then_some(TimeRange::Year)
    }

    async fn search_theme(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        theme: &Theme,
    ) -> Vec<Evidence> {
        let request = SearchRequest::new(&theme.question, self.max_results)
            .with_time_range(Self::time_range(query));

        match ctx.search(&request).await {
            Ok(response) => {
                let evidence: Vec<Evidence> = response
                    .hits
                    .into_iter()
                    .filter(|hit| query.window.contains(hit.published.as_deref()))
                    .map(|hit| from_hit(hit, SourceTool::Search))
                    .collect();
                debug!(theme = %theme.id, evidence = evidence.len(), "Search theme complete");
                evidence
            }
            Err(e) => {
                log_skip(&theme.id, &e);
                Vec::new()
            }
        }
    }

    async fn answer_theme(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        theme: &Theme,
    ) -> Vec<Evidence> {
        let mode = match theme.strategy {
            RetrievalStrategy::Reasoning => AnswerMode::Reasoning,
            _ => AnswerMode::Pro,
        };

        let answer = match ctx.ask(&AnswerRequest::new(theme.question.clone(), mode)).await {
            Ok(answer) => answer,
            Err(e) => {
                log_skip(&theme.id, &e);
                return Vec::new();
            }
        };

        let mut seen = HashSet::new();
        let citations: Vec<String> = answer
            .citations
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
            .take(MAX_CITATIONS_PER_ANSWER)
            .map(str::to_string)
            .collect();
        if citations.is_empty() {
            debug!(theme = %theme.id, "Answer returned no citations");
            return Vec::new();
        }

        let follow_up = SearchRequest::new(&theme.question, self.max_results);
        let hits = match ctx.search(&follow_up).await {
            Ok(response) => response.hits,
            Err(e) => {
                debug!(theme = %theme.id, reason = %e, "Follow-up search unavailable, keeping bare citations");
                Vec::new()
            }
        };

        let evidence = enrich_citations(&citations, hits, query);
        debug!(theme = %theme.id, evidence = evidence.len(), "Answer theme complete");
        evidence
    }
}

/// Pair each cited URL with a search hit from the same host when one is in the window.
pub fn enrich_citations(
    citations: &[String],
    hits: Vec<SearchHit>,
    query: &ResearchQuery,
) -> Vec<Evidence> {
    let mut by_host: HashMap<String, SearchHit> = HashMap::new();
    for hit in hits {
        if let Some(host) = host_of(&hit.url) {
            by_host.entry(host).or_insert(hit);
        }
    }

    citations
        .iter()
        .map(|url| {
            host_of(url)
                .and_then(|host| by_host.get(&host))
                .filter(|hit| query.window.contains(hit.published.as_deref()))
                .map(|hit| from_hit(hit.clone(), SourceTool::Search))
                .unwrap_or_else(|| Evidence::bare(url.clone(), SourceTool::Answer))
        })
        .collect()
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(normalize_host))
}

fn from_hit(hit: SearchHit, source: SourceTool) -> Evidence {
    Evidence {
        url: hit.url,
        title: hit.title,
        snippet: hit.snippet,
        published: hit.published,
        source,
    }
}

fn log_skip(theme: &str, error: &CallError) {
    if error.is_routing_signal() {
        debug!(theme, reason = %error, "Theme call skipped");
    } else {
        warn!(theme, error = %error, "Theme call failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::RunBudget;
    use crate::cache::CacheGateway;
    use crate::config::BudgetProfile;
    use crate::providers::{
        MockAnswerProvider, MockLanguageModel, MockSearchProvider, ProviderSet,
    };
    use crate::research::context::CallTimeouts;
    use crate::research::session::NoOpResearchCallback;
    use crate::types::DateWindow;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn theme(id: &str, strategy: RetrievalStrategy) -> Theme {
        Theme {
            id: id.to_string(),
            question: format!("question {id}"),
            strategy,
            rationale: None,
        }
    }

    fn ctx(
        search: Arc<MockSearchProvider>,
        answer: Arc<MockAnswerProvider>,
        max_search: usize,
    ) -> RunContext {
        let profile = BudgetProfile {
            max_search_calls: max_search,
            max_answer_calls: 6,
            max_language_model_calls: 4,
            deadline_secs: 60,
            allow_premium_tier: false,
        };
        RunContext::new(
            RunBudget::new(&profile),
            Arc::new(CacheGateway::disabled()),
            ProviderSet::new(search, answer, Arc::new(MockLanguageModel::new())),
            CallTimeouts::default(),
        )
    }

    fn hits() -> Vec<SearchHit> {
        vec![
            SearchHit::new("https://www.nature.com/articles/abc")
                .titled("Nature article")
                .published("2024-03-01"),
            SearchHit::new("https://old.example.org/post").published("2019-01-01"),
        ]
    }

    #[tokio::test]
    async fn test_fact_theme_uses_search_and_window() {
        let search = Arc::new(MockSearchProvider::with_hits(hits()));
        let answer = Arc::new(MockAnswerProvider::new());
        let ctx = ctx(search.clone(), answer.clone(), 4);
        let query = ResearchQuery::new("q").with_window(DateWindow::new(
            NaiveDate::from_ymd_opt(2023, 1, 1),
            None,
        ));

        let evidence = EvidenceGatherer::new(8)
            .gather(&ctx, &query, &[theme("t1", RetrievalStrategy::Fact)], &NoOpResearchCallback)
            .await;

        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].source, SourceTool::Search);
        assert_eq!(answer.call_count(), 0);
        assert_eq!(search.requests()[0].time_range, Some(TimeRange::Year));
        assert_eq!(search.requests()[0].max_results, 8);
    }

    #[tokio::test]
    async fn test_answer_theme_enriches_matching_hosts() {
        let search = Arc::new(MockSearchProvider::with_hits(hits()));
        let answer = Arc::new(MockAnswerProvider::with_answer(
            "Answer text",
            vec![
                "https://m.nature.com/articles/other".to_string(),
                "https://unknown.example/page".to_string(),
                "https://unknown.example/page".to_string(),
                "  ".to_string(),
            ],
        ));
        let ctx = ctx(search.clone(), answer.clone(), 4);

        let evidence = EvidenceGatherer::new(8)
            .gather(
                &ctx,
                &ResearchQuery::new("q"),
                &[theme("t1", RetrievalStrategy::Reasoning)],
                &NoOpResearchCallback,
            )
            .await;

        assert_eq!(evidence.len(), 2);
        assert_eq!(evidence[0].title.as_deref(), Some("Nature article"));
        assert_eq!(evidence[1], Evidence::bare("https://unknown.example/page", SourceTool::Answer));
        assert_eq!(answer.requests()[0].mode, AnswerMode::Reasoning);
        assert_eq!(search.requests()[0].time_range, None);
    }

    #[tokio::test]
    async fn test_follow_up_failure_keeps_bare_citations() {
        let search = Arc::new(MockSearchProvider::failing());
        let answer = Arc::new(MockAnswerProvider::with_answer(
            "text",
            vec!["https://a.example/1".to_string()],
        ));
        let ctx = ctx(search, answer, 4);

        let evidence = EvidenceGatherer::new(8)
            .gather(
                &ctx,
                &ResearchQuery::new("q"),
                &[theme("t1", RetrievalStrategy::Knowledge)],
                &NoOpResearchCallback,
            )
            .await;
        assert_eq!(evidence, vec![Evidence::bare("https://a.example/1", SourceTool::Answer)]);
    }

    #[tokio::test]
    async fn test_zero_search_budget_returns_empty() {
        let search = Arc::new(MockSearchProvider::with_hits(hits()));
        let ctx = ctx(search.clone(), Arc::new(MockAnswerProvider::new()), 0);
        let themes = [
            theme("t1", RetrievalStrategy::Fact),
            theme("t2", RetrievalStrategy::Fact),
        ];

        let evidence = EvidenceGatherer::new(8)
            .gather(&ctx, &ResearchQuery::new("q"), &themes, &NoOpResearchCallback)
            .await;
        assert!(evidence.is_empty());
        assert_eq!(search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_one_failing_theme_does_not_abort_others() {
        let search = Arc::new(MockSearchProvider::with_hits(hits()));
        let answer = Arc::new(MockAnswerProvider::failing());
        let ctx = ctx(search, answer, 4);
        let themes = [
            theme("t1", RetrievalStrategy::Knowledge),
            theme("t2", RetrievalStrategy::Fact),
        ];

        let evidence = EvidenceGatherer::new(8)
            .gather(&ctx, &ResearchQuery::new("q"), &themes, &NoOpResearchCallback)
            .await;
        assert_eq!(evidence.len(), 2);
    }
}
