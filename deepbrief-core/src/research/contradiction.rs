//! Contradiction statements between the strongest clusters.
//!
//! A best-effort keyword scan over the answer engine's comparison of the two
//! strongest clusters. When the call is unavailable or nothing matches, a
//! canned statement naming the clusters is used instead.

use super::context::RunContext;
use super::prompts;
use super::text::{split_statements, strip_citation_markers, truncate_chars};
use crate::budget::ProviderClass;
use crate::providers::{AnswerMode, AnswerRequest};
use crate::types::{EvidenceCluster, ResearchQuery};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Maximum statements kept.
pub const MAX_CONTRADICTIONS: usize = 3;
const MAX_STATEMENT_CHARS: usize = 300;

const CONFLICT_KEYWORDS: &[&str] = &[
    "contradict",
    "conflict",
    "differ",
    "disagree",
    "inconsistent",
    "diverge",
    "versus",
    " vs ",
];

pub struct ContradictionAnalyzer;

impl ContradictionAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub async fn analyze(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        clusters: &[EvidenceCluster],
    ) -> Vec<String> {
        let mut ranked: Vec<&EvidenceCluster> = clusters.iter().collect();
        ranked.sort_by(|a, b| b.strength.total_cmp(&a.strength));

        let primary = match ranked.as_slice() {
            [] => return Vec::new(),
            [only] => vec![single_cluster_statement(only)],
            [first, second, ..] => self.compare(ctx, query, first, second).await,
        };

        let notes = clusters.iter().flat_map(|c| c.contradictions.iter().cloned());
        let statements = finalize(primary.into_iter().chain(notes));
        info!(statements = statements.len(), "Contradictions analyzed");
        statements
    }

    async fn compare(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        first: &EvidenceCluster,
        second: &EvidenceCluster,
    ) -> Vec<String> {
        if ctx.budget().deadline_exceeded() || !ctx.budget().has_remaining(ProviderClass::Answer) {
            debug!("Contrast call unavailable, using canned statement");
            return vec![canned_statement(first, second)];
        }

        let request = AnswerRequest::new(
            prompts::contrast_prompt(query, first, second),
            AnswerMode::Pro,
        );
        match ctx.ask(&request).await {
            Ok(answer) => {
                let found = scan_for_conflicts(&answer.text);
                if found.is_empty() {
                    debug!("No conflict statements in contrast answer, using canned statement");
                    vec![canned_statement(first, second)]
                } else {
                    found
                }
            }
            Err(e) => {
                if e.is_routing_signal() {
                    debug!(reason = %e, "Contrast call skipped");
                } else {
                    warn!(error = %e, "Contrast call failed");
                }
                vec![canned_statement(first, second)]
            }
        }
    }
}

impl Default for ContradictionAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Sentences and list items containing a conflict keyword.
pub fn scan_for_conflicts(text: &str) -> Vec<String> {
    split_statements(text)
        .into_iter()
        .map(|s| strip_citation_markers(&s).trim().to_string())
        .filter(|s| {
            let lower = format!(" {} ", s.to_lowercase());
            CONFLICT_KEYWORDS.iter().any(|k| lower.contains(k))
        })
        .collect()
}

fn finalize(statements: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    statements
        .map(|s| truncate_chars(s.trim(), MAX_STATEMENT_CHARS))
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .take(MAX_CONTRADICTIONS)
        .collect()
}

fn canned_statement(first: &EvidenceCluster, second: &EvidenceCluster) -> String {
    format!(
        "Sources grouped under \"{}\" and \"{}\" may differ in emphasis or conclusions; \
         key figures should be checked across both.",
        first.theme, second.theme
    )
}

fn single_cluster_statement(cluster: &EvidenceCluster) -> String {
    format!(
        "All evidence falls under \"{}\", so its claims could not be cross-checked \
         against an independent group of sources.",
        cluster.theme
    )
}
