//! Report synthesis as an ordered chain of strategies.
//!
//! Strategies are tried from most to least capable until one returns a
//! report. The chain always ends with [`TemplateSynthesis`], which makes no
//! provider calls and cannot fail. Whatever strategy succeeds, the report is
//! then sanitized so every finding carries a citation and the summary and
//! section list are non-empty.

use super::context::RunContext;
use super::extract::extract_json_object;
use super::prompts;
use super::session::ResearchCallback;
use super::text::{first_sentence, split_paragraphs, strip_citation_markers, truncate_chars};
use crate::config::SynthesisConfig;
use crate::error::{ParseError, SynthesisError};
use crate::providers::{AnswerMode, AnswerRequest, CompletionRequest, CompletionResponse};
use crate::types::{
    Citation, Confidence, Evidence, EvidenceCluster, KeyFinding, Report, ReportSection,
    ResearchQuery, SynthesisTier,
};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const RESTRUCTURE_TEMPERATURE: f32 = 0.2;

pub const SEGMENTED_LIMITATION: &str =
    "Structured synthesis was unavailable; the report was assembled from narrative paragraphs.";
pub const TEMPLATE_LIMITATION: &str =
    "Provider synthesis was unavailable; the report was generated from cluster metadata only.";
pub const EARLY_EXIT_LIMITATION: &str = "terminated early due to runtime cap";

/// Everything a strategy may draw on.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub query: &'a ResearchQuery,
    pub clusters: &'a [EvidenceCluster],
    pub evidence: &'a [Evidence],
    pub contradictions: &'a [String],
}

/// State carried between strategies within one synthesis.
#[derive(Debug, Clone, Default)]
pub struct Scratch {
    /// Narrative text from the answer engine, if any call produced one.
    pub narrative: Option<String>,
    pub narrative_citations: Vec<String>,
}

#[async_trait]
pub trait SynthesisStrategy: Send + Sync {
    fn tier(&self) -> SynthesisTier;

    async fn synthesize(
        &self,
        ctx: &RunContext,
        input: &SynthesisInput<'_>,
        scratch: &mut Scratch,
    ) -> Result<Report, SynthesisError>;
}

/// Narrative pass followed by a structured restructure call.
pub struct StructuredSynthesis {
    max_citeable: usize,
}

impl StructuredSynthesis {
    pub fn new(max_citeable: usize) -> Self {
        Self { max_citeable }
    }

    async fn narrative(
        ctx: &RunContext,
        input: &SynthesisInput<'_>,
        scratch: &mut Scratch,
    ) -> Result<String, SynthesisError> {
        if let Some(text) = &scratch.narrative {
            return Ok(text.clone());
        }
        let mode = if ctx.budget().allows_premium_tier() {
            AnswerMode::DeepResearch
        } else {
            AnswerMode::Pro
        };
        let prompt = prompts::narrative_prompt(input.query, input.clusters, input.contradictions);
        let answer = ctx.ask(&AnswerRequest::new(prompt, mode)).await?;
        if answer.text.trim().is_empty() {
            return Err(SynthesisError::NoNarrative);
        }
        scratch.narrative = Some(answer.text.clone());
        scratch.narrative_citations = answer
            .citations
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        debug!(mode = mode.as_str(), citations = scratch.narrative_citations.len(), "Narrative pass complete");
        Ok(answer.text)
    }
}

#[async_trait]
impl SynthesisStrategy for StructuredSynthesis {
    fn tier(&self) -> SynthesisTier {
        SynthesisTier::Structured
    }

    async fn synthesize(
        &self,
        ctx: &RunContext,
        input: &SynthesisInput<'_>,
        scratch: &mut Scratch,
    ) -> Result<Report, SynthesisError> {
        let narrative = Self::narrative(ctx, input, scratch).await?;
        let citeable = &input.evidence[..input.evidence.len().min(self.max_citeable)];

        let request = CompletionRequest::new(
            prompts::restructure_messages(input.query, &narrative, citeable),
            RESTRUCTURE_TEMPERATURE,
        )
        .with_schema(prompts::report_schema());
        let response = ctx.complete(&request).await?;

        let mut report = parse_report(&response)?;
        report.query = input.query.text.clone();
        Ok(report)
    }
}

/// Parse a restructured report, requiring a summary and at least one section.
pub fn parse_report(response: &CompletionResponse) -> Result<Report, ParseError> {
    let structured = response
        .object
        .as_ref()
        .and_then(|v| serde_json::from_value::<Report>(v.clone()).ok());
    let report = match structured {
        Some(report) => report,
        None => extract_json_object::<Report>(response.text.as_deref().unwrap_or_default())?,
    };

    if report.executive_summary.trim().is_empty() {
        return Err(ParseError::Empty { what: "executive summary" });
    }
    if report.sections.is_empty() {
        return Err(ParseError::Empty { what: "report sections" });
    }
    Ok(report)
}

/// Paragraphs of the narrative assigned to summary, findings and sections by position.
pub struct SegmentedSynthesis {
    max_findings: usize,
}

impl SegmentedSynthesis {
    pub fn new(max_findings: usize) -> Self {
        Self { max_findings }
    }
}

#[async_trait]
impl SynthesisStrategy for SegmentedSynthesis {
    fn tier(&self) -> SynthesisTier {
        SynthesisTier::Segmented
    }

    async fn synthesize(
        &self,
        _ctx: &RunContext,
        input: &SynthesisInput<'_>,
        scratch: &mut Scratch,
    ) -> Result<Report, SynthesisError> {
        let narrative = scratch.narrative.as_deref().ok_or(SynthesisError::NoNarrative)?;
        let paragraphs: Vec<String> = split_paragraphs(&strip_citation_markers(narrative))
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let Some((summary, rest)) = paragraphs.split_first() else {
            return Err(SynthesisError::NoNarrative);
        };
        let body: &[String] = if rest.is_empty() { &paragraphs } else { rest };

        let pool = citation_pool(&scratch.narrative_citations, input);
        let mut next = 0usize;
        let mut cite = || {
            if pool.is_empty() {
                return Vec::new();
            }
            let citation = pool[next % pool.len()].clone();
            next += 1;
            vec![citation]
        };

        let key_findings = body
            .iter()
            .take(self.max_findings)
            .map(|p| KeyFinding {
                claim: first_sentence(p),
                citations: cite(),
                confidence: Confidence::Medium,
            })
            .collect();

        let sections = body
            .iter()
            .enumerate()
            .map(|(i, p)| ReportSection {
                heading: input
                    .clusters
                    .get(i)
                    .map(|c| c.theme.clone())
                    .unwrap_or_else(|| format!("Analysis {}", i + 1)),
                content: p.clone(),
                citations: cite(),
            })
            .collect();

        Ok(Report {
            query: input.query.text.clone(),
            executive_summary: summary.clone(),
            key_findings,
            sections,
            limitations: vec![SEGMENTED_LIMITATION.to_string()],
        })
    }
}

/// Narrative citation URLs, else cluster evidence, each titled from evidence when possible.
fn citation_pool(narrative_citations: &[String], input: &SynthesisInput<'_>) -> Vec<Citation> {
    let title_for = |url: &str| {
        input
            .evidence
            .iter()
            .find(|e| e.url == url)
            .and_then(|e| e.title.clone())
    };

    let urls: Vec<String> = if narrative_citations.is_empty() {
        input
            .clusters
            .iter()
            .flat_map(|c| c.evidence.iter().map(|e| e.url.clone()))
            .collect()
    } else {
        narrative_citations.to_vec()
    };

    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|u| !u.trim().is_empty() && seen.insert(u.clone()))
        .map(|url| Citation {
            title: title_for(&url),
            url,
        })
        .collect()
}

/// A report built from cluster metadata alone.
pub struct TemplateSynthesis;

impl TemplateSynthesis {
    pub fn build(input: &SynthesisInput<'_>) -> Report {
        let query = &input.query.text;
        let total: usize = input.clusters.iter().map(|c| c.evidence.len()).sum();
        let populated: Vec<&EvidenceCluster> =
            input.clusters.iter().filter(|c| !c.evidence.is_empty()).collect();

        let executive_summary = if populated.is_empty() {
            format!(
                "No external sources could be gathered for \"{query}\". \
                 This brief lists the research themes only."
            )
        } else {
            let themes: Vec<String> = populated
                .iter()
                .map(|c| format!("{} ({} sources)", c.theme, c.evidence.len()))
                .collect();
            format!(
                "Research on \"{query}\" gathered {total} sources across {} themes: {}.",
                populated.len(),
                themes.join(", ")
            )
        };

        let mut sections: Vec<ReportSection> = input
            .clusters
            .iter()
            .map(|c| ReportSection {
                heading: c.theme.clone(),
                content: format!(
                    "{} source(s) grouped under this theme, evidence strength {:.1} of 10.",
                    c.evidence.len(),
                    c.strength
                ),
                citations: Vec::new(),
            })
            .collect();
        if sections.is_empty() {
            sections.push(ReportSection {
                heading: "Overview".to_string(),
                content: executive_summary.clone(),
                citations: Vec::new(),
            });
        }

        Report {
            query: query.clone(),
            executive_summary,
            key_findings: Vec::new(),
            sections,
            limitations: vec![TEMPLATE_LIMITATION.to_string()],
        }
    }
}

#[async_trait]
impl SynthesisStrategy for TemplateSynthesis {
    fn tier(&self) -> SynthesisTier {
        SynthesisTier::Template
    }

    async fn synthesize(
        &self,
        _ctx: &RunContext,
        input: &SynthesisInput<'_>,
        _scratch: &mut Scratch,
    ) -> Result<Report, SynthesisError> {
        Ok(Self::build(input))
    }
}

/// Runs the strategy chain and sanitizes the result.
pub struct Synthesizer {
    chain: Vec<Box<dyn SynthesisStrategy>>,
}

impl Synthesizer {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self::with_chain(vec![
            Box::new(StructuredSynthesis::new(config.max_citeable_evidence)),
            Box::new(SegmentedSynthesis::new(config.segmented_findings)),
            Box::new(TemplateSynthesis),
        ])
    }

    pub fn with_chain(chain: Vec<Box<dyn SynthesisStrategy>>) -> Self {
        Self { chain }
    }

    pub async fn synthesize(
        &self,
        ctx: &RunContext,
        input: &SynthesisInput<'_>,
        callback: &dyn ResearchCallback,
    ) -> (Report, SynthesisTier) {
        let mut scratch = Scratch::default();

        for strategy in &self.chain {
            let tier = strategy.tier();
            match strategy.synthesize(ctx, input, &mut scratch).await {
                Ok(report) => {
                    callback.on_synthesis_tier(tier, true);
                    info!(tier = %tier, "Synthesis complete");
                    return (sanitize(report, input), tier);
                }
                Err(e) => {
                    callback.on_synthesis_tier(tier, false);
                    match &e {
                        SynthesisError::Call(call) if call.is_routing_signal() => {
                            debug!(tier = %tier, reason = %e, "Synthesis tier skipped");
                        }
                        _ => warn!(tier = %tier, error = %e, "Synthesis tier failed"),
                    }
                }
            }
        }

        let report = TemplateSynthesis::build(input);
        (sanitize(report, input), SynthesisTier::Template)
    }
}

/// Enforce the report invariants regardless of which strategy produced it.
///
/// Inline `[n]` markers are stripped from prose; the renderer numbers
/// sources itself from the structured citations.
pub fn sanitize(mut report: Report, input: &SynthesisInput<'_>) -> Report {
    let clean = |citations: Vec<Citation>| -> Vec<Citation> {
        citations
            .into_iter()
            .filter(|c| !c.url.trim().is_empty())
            .map(|c| Citation {
                url: c.url.trim().to_string(),
                title: c.title.filter(|t| !t.trim().is_empty()),
            })
            .collect()
    };

    let unmark = |text: &str| strip_citation_markers(text).trim().to_string();

    report.executive_summary = unmark(&report.executive_summary);
    for finding in &mut report.key_findings {
        finding.claim = unmark(&finding.claim);
        finding.citations = clean(std::mem::take(&mut finding.citations));
    }
    for section in &mut report.sections {
        section.content = unmark(&section.content);
        section.citations = clean(std::mem::take(&mut section.citations));
    }

    let before = report.key_findings.len();
    report
        .key_findings
        .retain(|f| !f.citations.is_empty() && !f.claim.trim().is_empty());
    let removed = before - report.key_findings.len();
    if removed > 0 {
        report
            .limitations
            .push(format!("{removed} key finding(s) removed due to missing citations."));
    }

    if report.executive_summary.trim().is_empty() {
        report.executive_summary = format!(
            "This brief summarizes available evidence on \"{}\".",
            truncate_chars(input.query.text.trim(), 200)
        );
    }
    if report.sections.is_empty() {
        report.sections.push(ReportSection {
            heading: "Overview".to_string(),
            content: report.executive_summary.clone(),
            citations: Vec::new(),
        });
    }
    if report.query.trim().is_empty() {
        report.query = input.query.text.clone();
    }

    let mut seen: HashSet<String> = report.limitations.iter().cloned().collect();
    for statement in input.contradictions {
        if seen.insert(statement.clone()) {
            report.limitations.push(statement.clone());
        }
    }
    report
}

/// Stub report for a run that hit its deadline.
pub fn early_exit_report(query: &ResearchQuery) -> Report {
    let executive_summary = format!(
        "Research on \"{}\" stopped before completion because the run deadline was reached.",
        truncate_chars(query.text.trim(), 200)
    );
    Report {
        query: query.text.clone(),
        executive_summary: executive_summary.clone(),
        key_findings: Vec::new(),
        sections: vec![ReportSection {
            heading: "Overview".to_string(),
            content: executive_summary,
            citations: Vec::new(),
        }],
        limitations: vec![EARLY_EXIT_LIMITATION.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::RunBudget;
    use crate::cache::CacheGateway;
    use crate::config::BudgetProfile;
    use crate::providers::{MockAnswerProvider, MockLanguageModel, MockSearchProvider, ProviderSet};
    use crate::research::context::CallTimeouts;
    use crate::research::session::NoOpResearchCallback;
    use crate::types::SourceTool;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    fn profile(premium: bool) -> BudgetProfile {
        BudgetProfile {
            max_search_calls: 0,
            max_answer_calls: 2,
            max_language_model_calls: 2,
            deadline_secs: 60,
            allow_premium_tier: premium,
        }
    }

    fn ctx(
        answer: Arc<MockAnswerProvider>,
        lm: Arc<MockLanguageModel>,
        profile: BudgetProfile,
    ) -> RunContext {
        RunContext::new(
            RunBudget::new(&profile),
            Arc::new(CacheGateway::disabled()),
            ProviderSet::new(Arc::new(MockSearchProvider::new()), answer, lm),
            CallTimeouts::default(),
        )
    }

    fn evidence() -> Vec<Evidence> {
        let mut a = Evidence::bare("https://a.example/1", SourceTool::Search);
        a.title = Some("Source A".to_string());
        vec![a, Evidence::bare("https://b.example/2", SourceTool::Answer)]
    }

    fn clusters(evidence: &[Evidence]) -> Vec<EvidenceCluster> {
        vec![EvidenceCluster {
            theme: "General".to_string(),
            evidence: evidence.to_vec(),
            strength: 4.4,
            contradictions: Vec::new(),
        }]
    }

    fn structured_report() -> serde_json::Value {
        json!({
            "query": "ignored",
            "executive_summary": "Solid-state cells are nearing pilot production.",
            "key_findings": [
                {"claim": "Pilot lines exist", "citations": [{"url": "https://a.example/1"}], "confidence": "high"},
                {"claim": "Uncited", "citations": [], "confidence": "low"},
                {"claim": "Blank url", "citations": [{"url": " "}], "confidence": "medium"}
            ],
            "sections": [{"heading": "Status", "content": "Details.", "citations": []}],
            "limitations": []
        })
    }

    #[tokio::test]
    async fn test_structured_tier() {
        let answer = Arc::new(MockAnswerProvider::with_answer(
            "Narrative text.",
            vec!["https://a.example/1".to_string()],
        ));
        let lm = Arc::new(MockLanguageModel::new());
        lm.queue_object(structured_report());
        let ctx = ctx(answer.clone(), lm.clone(), profile(false));

        let query = ResearchQuery::new("solid-state batteries");
        let evidence = evidence();
        let clusters = clusters(&evidence);
        let contradictions = vec!["Sources conflict on cost.".to_string()];
        let input = SynthesisInput {
            query: &query,
            clusters: &clusters,
            evidence: &evidence,
            contradictions: &contradictions,
        };

        let (report, tier) = Synthesizer::new(&SynthesisConfig::default())
            .synthesize(&ctx, &input, &NoOpResearchCallback)
            .await;

        assert_eq!(tier, SynthesisTier::Structured);
        assert_eq!(report.query, "solid-state batteries");
        assert_eq!(report.key_findings.len(), 1);
        assert_eq!(
            report.limitations,
            vec![
                "2 key finding(s) removed due to missing citations.".to_string(),
                "Sources conflict on cost.".to_string(),
            ]
        );
        assert_eq!(answer.requests()[0].mode, AnswerMode::Pro);
        assert!(lm.requests()[0].schema.is_some());
    }

    #[tokio::test]
    async fn test_premium_uses_deep_research() {
        let answer = Arc::new(MockAnswerProvider::with_answer("Narrative.", Vec::new()));
        let lm = Arc::new(MockLanguageModel::new());
        lm.queue_object(structured_report());
        let ctx = ctx(answer.clone(), lm, profile(true));

        let query = ResearchQuery::new("q");
        let input = SynthesisInput {
            query: &query,
            clusters: &[],
            evidence: &[],
            contradictions: &[],
        };
        Synthesizer::new(&SynthesisConfig::default())
            .synthesize(&ctx, &input, &NoOpResearchCallback)
            .await;
        assert_eq!(answer.requests()[0].mode, AnswerMode::DeepResearch);
    }

    #[tokio::test]
    async fn test_restructure_failure_segments_narrative() {
        let answer = Arc::new(MockAnswerProvider::with_answer(
            "Summary paragraph.\n\nFirst point [1]. More detail.\n\nSecond point.",
            vec!["https://a.example/1".to_string(), "https://c.example/3".to_string()],
        ));
        let lm = Arc::new(MockLanguageModel::new());
        let ctx = ctx(answer.clone(), lm.clone(), profile(false));

        let query = ResearchQuery::new("q");
        let evidence = evidence();
        let clusters = clusters(&evidence);
        let input = SynthesisInput {
            query: &query,
            clusters: &clusters,
            evidence: &evidence,
            contradictions: &[],
        };

        let (report, tier) = Synthesizer::new(&SynthesisConfig::default())
            .synthesize(&ctx, &input, &NoOpResearchCallback)
            .await;

        assert_eq!(tier, SynthesisTier::Segmented);
        assert_eq!(report.executive_summary, "Summary paragraph.");
        assert_eq!(report.key_findings.len(), 2);
        assert_eq!(report.key_findings[0].claim, "First point.");
        assert_eq!(report.key_findings[0].citations[0].title.as_deref(), Some("Source A"));
        assert_eq!(report.key_findings[1].citations[0].url, "https://c.example/3");
        assert_eq!(report.sections[0].heading, "General");
        assert_eq!(report.sections[1].heading, "Analysis 2");
        assert_eq!(report.limitations, vec![SEGMENTED_LIMITATION.to_string()]);
        assert_eq!(answer.call_count(), 1);
        assert_eq!(lm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_uses_template() {
        let ctx = ctx(
            Arc::new(MockAnswerProvider::failing()),
            Arc::new(MockLanguageModel::failing()),
            profile(false),
        );
        let query = ResearchQuery::new("q");
        let evidence = evidence();
        let clusters = clusters(&evidence);
        let input = SynthesisInput {
            query: &query,
            clusters: &clusters,
            evidence: &evidence,
            contradictions: &[],
        };

        let (report, tier) = Synthesizer::new(&SynthesisConfig::default())
            .synthesize(&ctx, &input, &NoOpResearchCallback)
            .await;
        assert_eq!(tier, SynthesisTier::Template);
        assert_eq!(report.citation_count(), 0);
        assert!(report.executive_summary.contains("General (2 sources)"));
        assert_eq!(report.sections[0].heading, "General");
        assert_eq!(report.limitations, vec![TEMPLATE_LIMITATION.to_string()]);
    }

    #[test]
    fn test_template_without_clusters() {
        let query = ResearchQuery::new("q");
        let input = SynthesisInput {
            query: &query,
            clusters: &[],
            evidence: &[],
            contradictions: &[],
        };
        let report = TemplateSynthesis::build(&input);
        assert!(!report.executive_summary.is_empty());
        assert_eq!(report.sections.len(), 1);
    }

    #[test]
    fn test_sanitize_fills_empty_fields() {
        let query = ResearchQuery::new("battery costs");
        let input = SynthesisInput {
            query: &query,
            clusters: &[],
            evidence: &[],
            contradictions: &[],
        };
        let report = sanitize(
            Report {
                query: String::new(),
                executive_summary: "  ".to_string(),
                key_findings: Vec::new(),
                sections: Vec::new(),
                limitations: Vec::new(),
            },
            &input,
        );
        assert!(report.executive_summary.contains("battery costs"));
        assert_eq!(report.sections.len(), 1);
        assert_eq!(report.query, "battery costs");
    }

    #[test]
    fn test_sanitize_strips_inline_markers() {
        let query = ResearchQuery::new("q");
        let input = SynthesisInput {
            query: &query,
            clusters: &[],
            evidence: &[],
            contradictions: &[],
        };
        let report = sanitize(
            Report {
                query: "q".to_string(),
                executive_summary: "Costs fell [3].".to_string(),
                key_findings: vec![
                    KeyFinding {
                        claim: "Yields rose [1][2] in 2024.".to_string(),
                        citations: vec![Citation::new("https://a.example/1")],
                        confidence: Confidence::Medium,
                    },
                    KeyFinding {
                        claim: "[4]".to_string(),
                        citations: vec![Citation::new("https://a.example/1")],
                        confidence: Confidence::Low,
                    },
                ],
                sections: vec![ReportSection {
                    heading: "Costs".to_string(),
                    content: "Costs fell [3].\n\nPrices held [12].".to_string(),
                    citations: vec![Citation::new("https://b.example/2")],
                }],
                limitations: Vec::new(),
            },
            &input,
        );
        assert_eq!(report.executive_summary, "Costs fell.");
        assert_eq!(report.key_findings.len(), 1);
        assert_eq!(report.key_findings[0].claim, "Yields rose in 2024.");
        assert_eq!(report.sections[0].content, "Costs fell.\n\nPrices held.");
        assert_eq!(
            report.limitations,
            vec!["1 key finding(s) removed due to missing citations.".to_string()]
        );
    }

    #[test]
    fn test_parse_report_requires_sections() {
        let response = CompletionResponse::object(json!({
            "query": "q", "executive_summary": "s", "key_findings": [], "sections": [], "limitations": []
        }));
        assert_eq!(
            parse_report(&response).unwrap_err(),
            ParseError::Empty { what: "report sections" }
        );
    }

    #[test]
    fn test_early_exit_report() {
        let report = early_exit_report(&ResearchQuery::new("q"));
        assert_eq!(report.limitations, vec![EARLY_EXIT_LIMITATION.to_string()]);
        assert_eq!(report.sections.len(), 1);
    }
}
