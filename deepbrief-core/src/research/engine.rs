//! Research engine: runs the pipeline from query to rendered report.

use super::clustering::EvidenceClusterer;
use super::context::{CallTimeouts, RunContext};
use super::contradiction::ContradictionAnalyzer;
use super::decomposition::QuestionDecomposer;
use super::dedup::dedup;
use super::gather::EvidenceGatherer;
use super::output::ReportRenderer;
use super::session::{ResearchCallback, ResearchPhase, ResearchSession, noop_callback};
use super::synthesis::{EARLY_EXIT_LIMITATION, SynthesisInput, Synthesizer, early_exit_report};
use crate::budget::RunBudget;
use crate::cache::CacheGateway;
use crate::config::DeepBriefConfig;
use crate::error::DeepBriefError;
use crate::providers::ProviderSet;
use crate::types::{
    Evidence, EvidenceCluster, Report, ResearchQuery, RunMeta, SynthesisTier, Theme,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub report: Report,
    pub markdown: String,
    pub meta: RunMeta,
    pub themes: Vec<Theme>,
    pub clusters: Vec<EvidenceCluster>,
    pub contradictions: Vec<String>,
}

/// Shared across concurrent runs; each run gets its own budget and deadline.
pub struct ResearchEngine {
    config: DeepBriefConfig,
    cache: Arc<CacheGateway>,
    providers: ProviderSet,
    decomposer: QuestionDecomposer,
    gatherer: EvidenceGatherer,
    clusterer: EvidenceClusterer,
    contradictions: ContradictionAnalyzer,
    synthesizer: Synthesizer,
}

impl ResearchEngine {
    pub fn new(config: DeepBriefConfig, cache: Arc<CacheGateway>, providers: ProviderSet) -> Self {
        Self {
            decomposer: QuestionDecomposer::new(),
            gatherer: EvidenceGatherer::new(config.providers.search.max_results),
            clusterer: EvidenceClusterer::new(config.clustering.clone()),
            contradictions: ContradictionAnalyzer::new(),
            synthesizer: Synthesizer::new(&config.synthesis),
            config,
            cache,
            providers,
        }
    }

    /// Build the HTTP providers and the configured cache backend.
    pub fn from_config(config: DeepBriefConfig) -> Result<Self, DeepBriefError> {
        let providers = ProviderSet::from_config(&config.providers)?;
        let cache = Arc::new(CacheGateway::from_config(&config.cache));
        Ok(Self::new(config, cache, providers))
    }

    pub fn config(&self) -> &DeepBriefConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheGateway> {
        &self.cache
    }

    /// Run the full pipeline. Never fails; degraded runs say so in the report's limitations.
    pub async fn run(
        &self,
        query: &ResearchQuery,
        callback: Option<Arc<dyn ResearchCallback>>,
    ) -> ResearchOutcome {
        let callback = callback.unwrap_or_else(noop_callback);
        let cb = callback.as_ref();

        let profile = self.config.budget_for(query.mode);
        let ctx = RunContext::new(
            RunBudget::new(profile),
            self.cache.clone(),
            self.providers.clone(),
            CallTimeouts::from_config(&self.config.providers),
        );
        let mut session = ResearchSession::new(&query.text, query.mode);
        info!(run = %session.id, mode = %query.mode, "Research run started");

        let mut themes: Vec<Theme> = Vec::new();
        let mut evidence: Vec<Evidence> = Vec::new();
        let mut clusters: Vec<EvidenceCluster> = Vec::new();
        let mut contradictions: Vec<String> = Vec::new();

        let synthesized = 'pipeline: {
            session.transition(ResearchPhase::Decompose, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            themes = self.decomposer.decompose(&ctx, query).await;

            session.transition(ResearchPhase::Gather, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            let raw = self.gatherer.gather(&ctx, query, &themes, cb).await;

            session.transition(ResearchPhase::Dedup, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            let raw_count = raw.len();
            evidence = dedup(raw);
            info!(raw = raw_count, unique = evidence.len(), "Evidence deduplicated");

            session.transition(ResearchPhase::Cluster, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            clusters = self.clusterer.cluster(&ctx, query, &evidence).await;

            session.transition(ResearchPhase::Contradict, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            contradictions = self.contradictions.analyze(&ctx, query, &clusters).await;
            for statement in &contradictions {
                cb.on_contradiction_found(statement);
            }

            session.transition(ResearchPhase::Synthesize, cb);
            if ctx.budget().deadline_exceeded() {
                break 'pipeline None;
            }
            let input = SynthesisInput {
                query,
                clusters: &clusters,
                evidence: &evidence,
                contradictions: &contradictions,
            };
            Some(self.synthesizer.synthesize(&ctx, &input, cb).await)
        };

        let (report, tier) = match synthesized {
            Some((mut report, tier)) if ctx.budget().deadline_exceeded() => {
                session.terminate_early(cb);
                mark_late_finish(&mut report);
                (report, tier)
            }
            Some(result) => {
                session.transition(ResearchPhase::Render, cb);
                result
            }
            None => {
                session.terminate_early(cb);
                (early_exit_report(query), SynthesisTier::EarlyExit)
            }
        };

        let rendered = ReportRenderer::render(&report, &evidence);
        session.transition(ResearchPhase::Done, cb);

        let meta = RunMeta {
            mode: query.mode,
            calls: ctx.budget().usage(),
            cache_hits: ctx.cache_hits(),
            themes: themes.len(),
            evidence: evidence.len(),
            clusters: clusters.len(),
            citations: rendered.citation_count,
            tier,
            terminated_early: session.terminated_early,
            elapsed_ms: u64::try_from(ctx.budget().elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            run = %session.id,
            tier = %tier,
            calls = meta.calls.total(),
            cache_hits = meta.cache_hits,
            citations = meta.citations,
            elapsed_ms = meta.elapsed_ms,
            "Research run finished"
        );

        ResearchOutcome {
            report,
            markdown: rendered.markdown,
            meta,
            themes,
            clusters,
            contradictions,
        }
    }
}

/// A report finished after the deadline keeps its content but is flagged as cut short.
fn mark_late_finish(report: &mut Report) {
    if !report.limitations.iter().any(|l| l == EARLY_EXIT_LIMITATION) {
        report.limitations.push(EARLY_EXIT_LIMITATION.to_string());
    }
}
