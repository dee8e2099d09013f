//! Markdown rendering of a research report.

use super::dedup::canonicalize_url;
use crate::types::{Citation, Evidence, Report};
use std::collections::{HashMap, HashSet};
use std::fmt::Write;

/// Rendered Markdown plus the number of distinct sources it cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub markdown: String,
    pub citation_count: usize,
}

struct NumberedSource {
    url: String,
    title: Option<String>,
}

/// Assigns `[n]` numbers by first appearance, keyed by canonical URL.
#[derive(Default)]
struct CitationIndex {
    numbers: HashMap<String, usize>,
    sources: Vec<NumberedSource>,
}

impl CitationIndex {
    fn number(&mut self, citation: &Citation) -> usize {
        let key = canonicalize_url(&citation.url);
        if let Some(&n) = self.numbers.get(&key) {
            let source = &mut self.sources[n - 1];
            if source.title.is_none() {
                source.title = citation.title.clone();
            }
            return n;
        }
        self.sources.push(NumberedSource {
            url: citation.url.trim().to_string(),
            title: citation.title.clone(),
        });
        let n = self.sources.len();
        self.numbers.insert(key, n);
        n
    }

    fn markers(&mut self, citations: &[Citation]) -> String {
        let mut seen = HashSet::new();
        citations
            .iter()
            .map(|c| self.number(c))
            .filter(|n| seen.insert(*n))
            .map(|n| format!("[{n}]"))
            .collect()
    }
}

pub struct ReportRenderer;

impl ReportRenderer {
    pub fn render(report: &Report, evidence: &[Evidence]) -> RenderedReport {
        let mut index = CitationIndex::default();
        let mut out = String::new();

        let _ = writeln!(out, "# Research Brief\n");
        let _ = writeln!(out, "**Query:** {}\n", report.query);
        let _ = writeln!(out, "## Executive Summary\n\n{}\n", report.executive_summary.trim());

        if !report.key_findings.is_empty() {
            out.push_str("## Key Findings\n\n");
            for finding in &report.key_findings {
                let markers = index.markers(&finding.citations);
                let _ = writeln!(
                    out,
                    "- **{}** (_{} confidence_) {}",
                    finding.claim.trim(),
                    finding.confidence,
                    markers
                );
            }
            out.push('\n');
        }

        out.push_str("## Detailed Analysis\n\n");
        for section in &report.sections {
            let _ = writeln!(out, "### {}\n\n{}", section.heading.trim(), section.content.trim());
            if !section.citations.is_empty() {
                let _ = writeln!(out, "\nSources: {}", index.markers(&section.citations));
            }
            out.push('\n');
        }

        let by_url: HashMap<String, &Evidence> = evidence
            .iter()
            .map(|e| (canonicalize_url(&e.url), e))
            .collect();

        if !index.sources.is_empty() {
            out.push_str("## Sources\n\n");
            for (i, source) in index.sources.iter().enumerate() {
                let matched = by_url.get(&canonicalize_url(&source.url)).copied();
                let title = source
                    .title
                    .clone()
                    .or_else(|| matched.and_then(|e| e.title.clone()))
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| source.url.clone());
                let _ = write!(out, "{}. [{}]({})", i + 1, title.trim(), source.url);
                if let Some(published) = matched.and_then(|e| e.published.as_deref()) {
                    let _ = write!(out, " ({published})");
                }
                out.push('\n');
            }
            out.push('\n');
        }

        let mut listed: HashSet<String> = index.numbers.keys().cloned().collect();
        let uncited: Vec<&Evidence> = evidence
            .iter()
            .filter(|e| listed.insert(canonicalize_url(&e.url)))
            .collect();
        if !uncited.is_empty() {
            out.push_str("### Additional sources consulted\n\n");
            for e in uncited {
                match e.title.as_deref().filter(|t| !t.trim().is_empty()) {
                    Some(title) => {
                        let _ = writeln!(out, "- [{}]({})", title.trim(), e.url);
                    }
                    None => {
                        let _ = writeln!(out, "- <{}>", e.url);
                    }
                }
            }
            out.push('\n');
        }

        if !report.limitations.is_empty() {
            out.push_str("## Limitations\n\n");
            for limitation in &report.limitations {
                let _ = writeln!(out, "- {}", limitation.trim());
            }
        }

        RenderedReport {
            markdown: out.trim_end().to_string() + "\n",
            citation_count: index.sources.len(),
        }
    }
}
