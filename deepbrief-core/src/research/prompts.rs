//! Prompt text and output schemas for the provider calls.

use super::text::truncate_chars;
use crate::providers::ChatMessage;
use crate::types::{Evidence, EvidenceCluster, ResearchQuery};
use serde_json::{Value, json};
use std::fmt::Write;

const SNIPPET_CHARS: usize = 280;

fn window_clause(query: &ResearchQuery) -> String {
    match (query.window.from, query.window.to) {
        (None, None) => String::new(),
        (Some(from), None) => format!("\nOnly consider sources published on or after {from}."),
        (None, Some(to)) => format!("\nOnly consider sources published on or before {to}."),
        (Some(from), Some(to)) => {
            format!("\nOnly consider sources published between {from} and {to}.")
        }
    }
}

pub fn decompose_messages(query: &ResearchQuery) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Return only a JSON array. No prose."),
        ChatMessage::user(format!(
            "Decompose the user question into 3-6 non-overlapping sub-questions, \
             more for broad topics and fewer for narrow ones.\n\
             Label each as one of:\n\
             - factual (requires up-to-date sources, numbers or dates)\n\
             - knowledge (general synthesis)\n\
             - reasoning (multi-step inference or ambiguous)\n\
             Return a JSON array of objects: \
             {{ \"question\": \"...\", \"type\": \"factual|knowledge|reasoning\", \"rationale\": \"...\" }}.{}\n\
             User question: {}",
            window_clause(query),
            query.text
        )),
    ]
}

pub fn decompose_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "type": { "type": "string", "enum": ["factual", "knowledge", "reasoning"] },
                "rationale": { "type": "string" }
            },
            "required": ["question", "type"]
        }
    })
}

fn evidence_block(evidence: &[Evidence]) -> String {
    let mut out = String::new();
    for (i, e) in evidence.iter().enumerate() {
        let _ = write!(out, "{}. {}", i + 1, e.url);
        if let Some(title) = &e.title {
            let _ = write!(out, " | {title}");
        }
        if let Some(published) = &e.published {
            let _ = write!(out, " | {published}");
        }
        if let Some(snippet) = &e.snippet {
            let _ = write!(out, "\n   {}", truncate_chars(snippet, SNIPPET_CHARS));
        }
        out.push('\n');
    }
    out
}

pub fn cluster_messages(query: &ResearchQuery, evidence: &[Evidence]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Return only a JSON array. No prose."),
        ChatMessage::user(format!(
            "You are a research analyst. Cluster the evidence items below into 4-6 thematic \
             groups for the question \"{}\".\n\
             For each cluster provide a concise theme name, a strength score from 1 to 10 \
             based on citation count and source quality, key evidence statements (short, \
             using words from the items they describe) and any contradictions within the cluster.\n\
             Return a JSON array of objects: {{ \"theme\": \"...\", \"strength\": 8, \
             \"evidence_statements\": [\"...\"], \"contradictions\": [\"...\"] }}\n\n\
             Evidence items:\n{}",
            query.text,
            evidence_block(evidence)
        )),
    ]
}

pub fn cluster_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "theme": { "type": "string" },
                "strength": { "type": "number" },
                "evidence_statements": { "type": "array", "items": { "type": "string" } },
                "contradictions": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["theme", "evidence_statements"]
        }
    })
}

fn cluster_digest(cluster: &EvidenceCluster, max_items: usize) -> String {
    let mut out = format!(
        "Theme: {} (strength {:.1}, {} sources)\n",
        cluster.theme,
        cluster.strength,
        cluster.evidence.len()
    );
    out.push_str(&evidence_block(
        &cluster.evidence[..cluster.evidence.len().min(max_items)],
    ));
    out
}

pub fn contrast_prompt(
    query: &ResearchQuery,
    first: &EvidenceCluster,
    second: &EvidenceCluster,
) -> String {
    format!(
        "Research question: {}\n\n\
         Compare the two evidence clusters below. Identify specific points where the sources \
         contradict, conflict with, or differ from each other. State each point of \
         disagreement as one sentence on its own line.\n\n\
         Cluster 1:\n{}\nCluster 2:\n{}",
        query.text,
        cluster_digest(first, 8),
        cluster_digest(second, 8)
    )
}

pub fn narrative_prompt(
    query: &ResearchQuery,
    clusters: &[EvidenceCluster],
    contradictions: &[String],
) -> String {
    let mut out = format!(
        "Write a comprehensive, analyst-grade research brief answering: {}\n\n\
         Open with an executive summary paragraph, then cover each theme below in its own \
         paragraphs with specific figures and dates. Cite sources for every factual claim.{}\n\n",
        query.text,
        window_clause(query)
    );
    for cluster in clusters {
        out.push_str(&cluster_digest(cluster, 10));
        out.push('\n');
    }
    if !contradictions.is_empty() {
        out.push_str("Known points of disagreement:\n");
        for c in contradictions {
            let _ = writeln!(out, "- {c}");
        }
    }
    out
}

pub fn restructure_messages(
    query: &ResearchQuery,
    narrative: &str,
    citeable: &[Evidence],
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system("Return ONLY JSON strictly matching the provided schema."),
        ChatMessage::user(format!(
            "Evidence:\n{}\nDraft narrative:\n{}\n\n\
             Restructure the draft into a research report for the question below.\n\
             Rules:\n\
             - Use ONLY the provided evidence URLs as citations.\n\
             - Every key finding must cite at least one provided URL.\n\
             - Put citations in the \"citations\" arrays, not as [n] markers in text.\n\
             - Aim for at least 10 key findings and at least 3 sections.\n\
             - Put anything uncertain or conflicting under \"limitations\".\n\
             User question: {}",
            evidence_block(citeable),
            narrative,
            query.text
        )),
    ]
}

pub fn report_schema() -> Value {
    let citation = json!({
        "type": "object",
        "properties": {
            "url": { "type": "string" },
            "title": { "type": "string" }
        },
        "required": ["url"]
    });
    json!({
        "type": "object",
        "properties": {
            "query": { "type": "string" },
            "executive_summary": { "type": "string" },
            "key_findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "claim": { "type": "string" },
                        "citations": { "type": "array", "items": citation },
                        "confidence": { "type": "string", "enum": ["high", "medium", "low"] }
                    },
                    "required": ["claim", "citations", "confidence"]
                }
            },
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "heading": { "type": "string" },
                        "content": { "type": "string" },
                        "citations": { "type": "array", "items": citation }
                    },
                    "required": ["heading", "content", "citations"]
                }
            },
            "limitations": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["query", "executive_summary", "key_findings", "sections", "limitations"]
    })
}
