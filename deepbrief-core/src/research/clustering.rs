//! Grouping deduplicated evidence into themed clusters.

use super::context::RunContext;
use super::extract::extract_json_array;
use super::prompts;
use super::text::keyword_set;
use crate::budget::ProviderClass;
use crate::config::ClusteringConfig;
use crate::error::ParseError;
use crate::providers::{CompletionRequest, CompletionResponse};
use crate::types::{Evidence, EvidenceCluster, ResearchQuery};
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

const CLUSTER_TEMPERATURE: f32 = 0.2;

/// Label of the single cluster used below the model threshold.
pub const GENERAL_THEME: &str = "General";

#[derive(Debug, Clone, Deserialize)]
pub struct ProposedCluster {
    #[serde(default)]
    pub theme: String,
    #[serde(default, alias = "statements", alias = "key_evidence")]
    pub evidence_statements: Vec<String>,
    #[serde(default)]
    pub contradictions: Vec<String>,
}

pub struct EvidenceClusterer {
    config: ClusteringConfig,
}

impl EvidenceClusterer {
    pub fn new(config: ClusteringConfig) -> Self {
        Self { config }
    }

    /// Cluster evidence. Always returns at least one cluster, possibly empty.
    pub async fn cluster(
        &self,
        ctx: &RunContext,
        query: &ResearchQuery,
        evidence: &[Evidence],
    ) -> Vec<EvidenceCluster> {
        if evidence.len() < self.config.min_evidence_for_model {
            debug!(evidence = evidence.len(), "Below clustering threshold, single cluster");
            return vec![build_cluster(GENERAL_THEME, evidence.to_vec(), Vec::new())];
        }

        if ctx.budget().deadline_exceeded()
            || !ctx.budget().has_remaining(ProviderClass::LanguageModel)
        {
            debug!("Clustering call unavailable, chunking evidence");
            return self.chunked(evidence);
        }

        let sample = &evidence[..evidence.len().min(self.config.max_prompt_evidence)];
        let request = CompletionRequest::new(
            prompts::cluster_messages(query, sample),
            CLUSTER_TEMPERATURE,
        )
        .with_schema(prompts::cluster_schema());

        let proposed = match ctx.complete(&request).await {
            Ok(response) => match parse_clusters(&response) {
                Ok(proposed) => proposed,
                Err(e) => {
                    warn!(error = %e, "Clustering output unusable, chunking evidence");
                    return self.chunked(evidence);
                }
            },
            Err(e) => {
                if e.is_routing_signal() {
                    debug!(reason = %e, "Clustering call skipped, chunking evidence");
                } else {
                    warn!(error = %e, "Clustering call failed, chunking evidence");
                }
                return self.chunked(evidence);
            }
        };

        let proposed: Vec<ProposedCluster> =
            proposed.into_iter().take(self.config.max_clusters).collect();
        let clusters = assign(&proposed, evidence);
        if clusters.is_empty() {
            warn!("No evidence matched proposed clusters, chunking evidence");
            return self.chunked(evidence);
        }

        info!(clusters = clusters.len(), evidence = evidence.len(), "Evidence clustered");
        clusters
    }

    /// Even split into labeled groups, used whenever the model path is unavailable.
    pub fn chunked(&self, evidence: &[Evidence]) -> Vec<EvidenceCluster> {
        let groups = self.config.fallback_clusters.max(1);
        let size = evidence.len().div_ceil(groups).max(1);
        let clusters: Vec<EvidenceCluster> = evidence
            .chunks(size)
            .enumerate()
            .map(|(i, chunk)| {
                build_cluster(&format!("Evidence group {}", i + 1), chunk.to_vec(), Vec::new())
            })
            .collect();

        if clusters.is_empty() {
            vec![build_cluster(GENERAL_THEME, Vec::new(), Vec::new())]
        } else {
            clusters
        }
    }
}

/// Parse the model's cluster list, preferring the structured object.
pub fn parse_clusters(response: &CompletionResponse) -> Result<Vec<ProposedCluster>, ParseError> {
    let structured = response
        .object
        .as_ref()
        .and_then(|v| serde_json::from_value::<Vec<ProposedCluster>>(v.clone()).ok());
    let raw = match structured {
        Some(raw) => raw,
        None => extract_json_array(response.text.as_deref().unwrap_or_default())?,
    };

    let clusters: Vec<ProposedCluster> = raw
        .into_iter()
        .filter(|c| !c.theme.trim().is_empty())
        .collect();
    if clusters.is_empty() {
        return Err(ParseError::Empty { what: "clusters" });
    }
    Ok(clusters)
}

/// Assign each item to the proposed cluster sharing the most keywords.
///
/// Items with no overlap go to the currently smallest cluster. Empty clusters are dropped.
fn assign(proposed: &[ProposedCluster], evidence: &[Evidence]) -> Vec<EvidenceCluster> {
    if proposed.is_empty() {
        return Vec::new();
    }

    let profiles: Vec<HashSet<String>> = proposed
        .iter()
        .map(|c| {
            let mut words = keyword_set(&c.theme);
            for statement in &c.evidence_statements {
                words.extend(keyword_set(statement));
            }
            words
        })
        .collect();

    let mut buckets: Vec<Vec<Evidence>> = vec![Vec::new(); proposed.len()];
    for item in evidence {
        let text = format!(
            "{} {}",
            item.title.as_deref().unwrap_or_default(),
            item.snippet.as_deref().unwrap_or_default()
        );
        let words = keyword_set(&text);

        let best = profiles
            .iter()
            .enumerate()
            .map(|(i, profile)| (i, profile.intersection(&words).count()))
            .filter(|&(_, overlap)| overlap > 0)
            .fold(None::<(usize, usize)>, |best, (i, overlap)| match best {
                Some((_, top)) if top >= overlap => best,
                _ => Some((i, overlap)),
            });

        let target = match best {
            Some((i, _)) => i,
            None => buckets
                .iter()
                .enumerate()
                .min_by_key(|(_, b)| b.len())
                .map(|(i, _)| i)
                .unwrap_or(0),
        };
        buckets[target].push(item.clone());
    }

    proposed
        .iter()
        .zip(buckets)
        .filter(|(_, bucket)| !bucket.is_empty())
        .map(|(c, bucket)| build_cluster(c.theme.trim(), bucket, c.contradictions.clone()))
        .collect()
}

fn build_cluster(theme: &str, evidence: Vec<Evidence>, contradictions: Vec<String>) -> EvidenceCluster {
    let contradictions = contradictions
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    EvidenceCluster {
        theme: theme.to_string(),
        strength: strength(&evidence),
        evidence,
        contradictions,
    }
}

/// Score on a 0-10 scale from count and host diversity.
pub fn strength(evidence: &[Evidence]) -> f64 {
    let n = evidence.len();
    if n == 0 {
        return 0.0;
    }
    let hosts: HashSet<String> = evidence.iter().filter_map(Evidence::host).collect();
    6.0 * n.min(10) as f64 / 10.0 + 4.0 * hosts.len() as f64 / n as f64
}
