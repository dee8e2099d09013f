//! Core data types for a research run.

use crate::budget::CallCounts;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Budget and quality profile for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchMode {
    #[default]
    Standard,
    Deep,
}

impl fmt::Display for ResearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResearchMode::Standard => write!(f, "standard"),
            ResearchMode::Deep => write!(f, "deep"),
        }
    }
}

/// Inclusive publication-date window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether a published date falls inside the window.
    ///
    /// Missing or unparseable dates are kept.
    pub fn contains(&self, published: Option<&str>) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(date) = published.and_then(parse_published_date) else {
            return true;
        };
        if let Some(from) = self.from
            && date < from
        {
            return false;
        }
        if let Some(to) = self.to
            && date > to
        {
            return false;
        }
        true
    }
}

/// Parse an RFC 3339 timestamp or a `YYYY-MM-DD` prefix.
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

/// A research request. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchQuery {
    pub text: String,
    #[serde(default)]
    pub window: DateWindow,
    #[serde(default)]
    pub mode: ResearchMode,
}

impl ResearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            window: DateWindow::default(),
            mode: ResearchMode::Standard,
        }
    }

    pub fn with_mode(mut self, mode: ResearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_window(mut self, window: DateWindow) -> Self {
        self.window = window;
        self
    }
}

/// How a theme should be researched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Direct web search.
    Fact,
    /// Answer-engine synthesis.
    Knowledge,
    /// Answer engine in reasoning mode.
    Reasoning,
}

impl RetrievalStrategy {
    /// Map a model-provided tag; anything unrecognized is `Knowledge`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "fact" | "factual" | "fact-lookup" | "fact_lookup" | "search" => Self::Fact,
            "reasoning" | "reason" => Self::Reasoning,
            _ => Self::Knowledge,
        }
    }
}

/// A sub-topic of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: String,
    pub question: String,
    pub strategy: RetrievalStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Which provider produced an evidence item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTool {
    Search,
    Answer,
}

/// One normalized source reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    pub source: SourceTool,
}

impl Evidence {
    /// A bare reference with no metadata.
    pub fn bare(url: impl Into<String>, source: SourceTool) -> Self {
        Self {
            url: url.into(),
            title: None,
            snippet: None,
            published: None,
            source,
        }
    }

    /// Host of the URL, without a leading `www.` or `m.`.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(normalize_host))
    }
}

/// Lowercase a host and strip a leading `www.` or `m.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.to_ascii_lowercase();
    host.strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .map(str::to_string)
        .unwrap_or(host)
}

/// A named group of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCluster {
    pub theme: String,
    pub evidence: Vec<Evidence>,
    /// 0 to 10, derived from count and host diversity.
    pub strength: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contradictions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Citation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFinding {
    pub claim: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub confidence: Confidence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub heading: String,
    pub content: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

/// The structured research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub query: String,
    pub executive_summary: String,
    #[serde(default)]
    pub key_findings: Vec<KeyFinding>,
    #[serde(default)]
    pub sections: Vec<ReportSection>,
    #[serde(default)]
    pub limitations: Vec<String>,
}

impl Report {
    pub fn citation_count(&self) -> usize {
        self.key_findings
            .iter()
            .map(|f| f.citations.len())
            .chain(self.sections.iter().map(|s| s.citations.len()))
            .sum()
    }
}

/// Which synthesis strategy produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisTier {
    /// Narrative pass restructured into the report shape.
    Structured,
    /// Narrative segmented into paragraphs by position.
    Segmented,
    /// Built from cluster metadata with no provider calls.
    Template,
    /// The run hit its deadline and produced a stub.
    EarlyExit,
}

impl fmt::Display for SynthesisTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SynthesisTier::Structured => "structured",
            SynthesisTier::Segmented => "segmented",
            SynthesisTier::Template => "template",
            SynthesisTier::EarlyExit => "early_exit",
        };
        f.write_str(name)
    }
}

/// Run statistics returned with every report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub mode: ResearchMode,
    pub calls: CallCounts,
    pub cache_hits: usize,
    pub themes: usize,
    pub evidence: usize,
    pub clusters: usize,
    pub citations: usize,
    pub tier: SynthesisTier,
    pub terminated_early: bool,
    pub elapsed_ms: u64,
}
