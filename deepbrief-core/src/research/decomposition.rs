//! Query decomposition into researchable themes.
//!
//! One language-model call proposes the themes. When that call is skipped,
//! fails, or returns nothing usable, a keyword heuristic classifies the query
//! and fills a fixed template, so decomposition always yields themes.

use super::context::RunContext;
use super::extract::extract_json_array;
use super::prompts;
use crate::error::ParseError;
use crate::providers::{CompletionRequest, CompletionResponse};
use crate::types::{ResearchQuery, RetrievalStrategy, Theme};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Maximum themes kept from a model response.
pub const MAX_THEMES: usize = 8;

/// Upper bound on the heuristic template, comparison sides included.
const MAX_HEURISTIC_THEMES: usize = 4;

/// Sides of a comparative query that get their own theme.
const MAX_COMPARED_SIDES: usize = 3;

const DECOMPOSE_TEMPERATURE: f32 = 0.1;

/// Broad topic class used to pick a heuristic template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Travel,
    Market,
    Technology,
    General,
}

const TRAVEL_WORDS: &[&str] = &[
    "travel", "trip", "visit", "itinerary", "vacation", "holiday", "flight", "hotel", "tourism",
    "tourist", "destination", "visa",
];
const MARKET_WORDS: &[&str] = &[
    "market", "industry", "revenue", "competitor", "competitors", "pricing", "sales", "growth",
    "share", "investment", "investors", "startup", "startups", "business", "economy", "demand",
];
const TECH_WORDS: &[&str] = &[
    "technology", "software", "hardware", "battery", "batteries", "chip", "chips", "algorithm",
    "framework", "protocol", "ai", "model", "models", "semiconductor", "quantum", "solid-state",
    "engineering", "api", "database",
];

#[derive(Debug, Deserialize)]
struct RawTheme {
    #[serde(default)]
    question: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Turns a research query into themes.
pub struct QuestionDecomposer;

impl QuestionDecomposer {
    pub fn new() -> Self {
        Self
    }

    /// Decompose with the language model, falling back to the heuristic template.
    pub async fn decompose(&self, ctx: &RunContext, query: &ResearchQuery) -> Vec<Theme> {
        let request = CompletionRequest::new(prompts::decompose_messages(query), DECOMPOSE_TEMPERATURE)
            .with_schema(prompts::decompose_schema());

        let response = match ctx.complete(&request).await {
            Ok(response) => response,
            Err(e) if e.is_routing_signal() => {
                debug!(reason = %e, "Decomposition call skipped, using heuristic themes");
                return self.heuristic(query);
            }
            Err(e) => {
                warn!(error = %e, "Decomposition call failed, using heuristic themes");
                return self.heuristic(query);
            }
        };

        match Self::parse_themes(&response) {
            Ok(themes) => {
                info!(themes = themes.len(), "Decomposed query");
                themes
            }
            Err(e) => {
                warn!(error = %e, "Decomposition output unusable, using heuristic themes");
                self.heuristic(query)
            }
        }
    }

    /// Parse a model response into themes, preferring the structured object.
    pub fn parse_themes(response: &CompletionResponse) -> Result<Vec<Theme>, ParseError> {
        let structured = response
            .object
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<RawTheme>>(v.clone()).ok());

        let raw = match structured {
            Some(raw) => raw,
            None => {
                let text = response.text.as_deref().unwrap_or_default();
                extract_json_array::<Vec<RawTheme>>(text)?
            }
        };

        let themes = number_themes(
            raw.into_iter()
                .filter_map(|r| {
                    let question = r.question.trim().to_string();
                    if question.is_empty() {
                        return None;
                    }
                    let rationale = r
                        .rationale
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty());
                    Some((
                        question,
                        r.kind
                            .as_deref()
                            .map(RetrievalStrategy::from_tag)
                            .unwrap_or(RetrievalStrategy::Knowledge),
                        rationale,
                    ))
                })
                .take(MAX_THEMES)
                .collect(),
        );

        if themes.is_empty() {
            return Err(ParseError::Empty { what: "themes" });
        }
        Ok(themes)
    }

    /// Keyword-driven template decomposition. Returns two to four themes.
    pub fn heuristic(&self, query: &ResearchQuery) -> Vec<Theme> {
        let topic = topic_of(&query.text);
        let kind = classify(&query.text);
        debug!(kind = ?kind, "Heuristic decomposition");

        let mut drafts: Vec<(String, RetrievalStrategy, Option<String>)> = match kind {
            QueryKind::Travel => vec![
                (
                    format!("Current entry requirements, costs and logistics for {topic}"),
                    RetrievalStrategy::Fact,
                    Some("Practical facts change often".to_string()),
                ),
                (
                    format!("Best times to go, local conditions and practical tips for {topic}"),
                    RetrievalStrategy::Knowledge,
                    None,
                ),
                (
                    format!("Safety considerations and recent advisories relevant to {topic}"),
                    RetrievalStrategy::Fact,
                    None,
                ),
            ],
            QueryKind::Market => vec![
                (
                    format!("Market size, growth rate and key figures for {topic}"),
                    RetrievalStrategy::Fact,
                    Some("Quantitative baseline".to_string()),
                ),
                (
                    format!("Major players and competitive landscape of {topic}"),
                    RetrievalStrategy::Knowledge,
                    None,
                ),
                (
                    format!("Growth drivers, risks and outlook for {topic}"),
                    RetrievalStrategy::Reasoning,
                    None,
                ),
            ],
            QueryKind::Technology => vec![
                (
                    format!("Latest developments and current state of {topic}"),
                    RetrievalStrategy::Fact,
                    Some("Recent results and announcements".to_string()),
                ),
                (
                    format!("How {topic} works and its key technical trade-offs"),
                    RetrievalStrategy::Knowledge,
                    None,
                ),
                (
                    format!("Adoption barriers, open problems and outlook for {topic}"),
                    RetrievalStrategy::Reasoning,
                    None,
                ),
            ],
            QueryKind::General => vec![
                (
                    format!("Key facts and recent developments: {topic}"),
                    RetrievalStrategy::Fact,
                    None,
                ),
                (
                    format!("Background and context: {topic}"),
                    RetrievalStrategy::Knowledge,
                    None,
                ),
            ],
        };

        let sides = split_comparative(&query.text);
        if sides.len() >= 2 {
            let sides = &sides[..sides.len().min(MAX_COMPARED_SIDES)];
            drafts.truncate(MAX_HEURISTIC_THEMES - sides.len());
            for side in sides {
                drafts.push((
                    format!("Key facts and figures about {side}"),
                    RetrievalStrategy::Fact,
                    Some("Comparison side".to_string()),
                ));
            }
        }

        number_themes(drafts)
    }
}

impl Default for QuestionDecomposer {
    fn default() -> Self {
        Self::new()
    }
}

fn number_themes(drafts: Vec<(String, RetrievalStrategy, Option<String>)>) -> Vec<Theme> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(i, (question, strategy, rationale))| Theme {
            id: format!("t{}", i + 1),
            question,
            strategy,
            rationale,
        })
        .collect()
}

fn topic_of(text: &str) -> String {
    let topic = text.trim().trim_end_matches(['?', '.', '!']).trim();
    if topic.is_empty() {
        "the topic".to_string()
    } else {
        topic.to_string()
    }
}

/// Classify a query by keyword hits; ties resolve travel, market, technology.
pub fn classify(text: &str) -> QueryKind {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();
    let hits = |list: &[&str]| words.iter().filter(|w| list.contains(w)).count();

    let scores = [
        (QueryKind::Travel, hits(TRAVEL_WORDS)),
        (QueryKind::Market, hits(MARKET_WORDS)),
        (QueryKind::Technology, hits(TECH_WORDS)),
    ];
    scores
        .iter()
        .filter(|(_, score)| *score > 0)
        .fold(None::<(QueryKind, usize)>, |best, &(kind, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((kind, score)),
        })
        .map(|(kind, _)| kind)
        .unwrap_or(QueryKind::General)
}

/// Split a comparative question into its sides.
fn split_comparative(question: &str) -> Vec<String> {
    let lower = question.to_lowercase();
    for sep in [" vs. ", " vs ", " versus ", " compared to ", " compared with "] {
        if lower.contains(sep) {
            return lower
                .split(sep)
                .map(|s| s.trim().trim_end_matches(['?', '.']).trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_structured_object() {
        let response = CompletionResponse::object(json!([
            {"question": "What is the energy density?", "type": "factual"},
            {"question": "  ", "type": "knowledge"},
            {"question": "Why are yields low?", "type": "reasoning", "rationale": "causal"},
            {"question": "Who makes them?", "type": "something-else"}
        ]));
        let themes = QuestionDecomposer::parse_themes(&response).unwrap();
        assert_eq!(themes.len(), 3);
        assert_eq!(themes[0].id, "t1");
        assert_eq!(themes[0].strategy, RetrievalStrategy::Fact);
        assert_eq!(themes[1].id, "t2");
        assert_eq!(themes[1].strategy, RetrievalStrategy::Reasoning);
        assert_eq!(themes[1].rationale.as_deref(), Some("causal"));
        assert_eq!(themes[2].strategy, RetrievalStrategy::Knowledge);
    }

    #[test]
    fn test_parse_text_with_prose() {
        let response = CompletionResponse::text(
            "Here you go:\n```json\n[{\"question\": \"Q1\", \"type\": \"factual\"}]\n```",
        );
        let themes = QuestionDecomposer::parse_themes(&response).unwrap();
        assert_eq!(themes.len(), 1);
    }

    #[test]
    fn test_parse_caps_at_eight() {
        let items: Vec<_> = (0..12)
            .map(|i| json!({"question": format!("Q{i}"), "type": "knowledge"}))
            .collect();
        let themes = QuestionDecomposer::parse_themes(&CompletionResponse::object(json!(items)))
            .unwrap();
        assert_eq!(themes.len(), MAX_THEMES);
        assert_eq!(themes[7].id, "t8");
    }

    #[test]
    fn test_parse_empty_list_is_failure() {
        let err = QuestionDecomposer::parse_themes(&CompletionResponse::object(json!([])))
            .unwrap_err();
        assert_eq!(err, ParseError::Empty { what: "themes" });
    }

    #[test]
    fn test_parse_prose_only_is_failure() {
        let err = QuestionDecomposer::parse_themes(&CompletionResponse::text("I cannot help."))
            .unwrap_err();
        assert!(matches!(err, ParseError::NoPayload { .. }));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("Plan a trip to Lisbon"), QueryKind::Travel);
        assert_eq!(classify("EV charging market growth in Europe"), QueryKind::Market);
        assert_eq!(
            classify("current state of solid-state batteries"),
            QueryKind::Technology
        );
        assert_eq!(classify("history of the printing press"), QueryKind::General);
    }

    #[test]
    fn test_heuristic_never_empty() {
        let decomposer = QuestionDecomposer::new();
        for text in ["", "?", "history of jazz", "hotel prices in Rome"] {
            let themes = decomposer.heuristic(&ResearchQuery::new(text));
            assert!(themes.len() >= 2, "too few themes for {text:?}");
            assert!(themes.iter().all(|t| !t.question.is_empty()));
        }
    }

    #[test]
    fn test_heuristic_three_way_comparison_stays_within_four() {
        let decomposer = QuestionDecomposer::new();
        let themes =
            decomposer.heuristic(&ResearchQuery::new("travel to Paris vs London vs Rome"));
        assert_eq!(themes.len(), 4);
        assert_eq!(themes[0].strategy, RetrievalStrategy::Fact);
        assert!(themes[1].question.ends_with("travel to paris"));
        assert!(themes[2].question.ends_with("london"));
        assert!(themes[3].question.ends_with("rome"));
        assert_eq!(themes[3].id, "t4");
    }

    #[test]
    fn test_heuristic_template_sizes() {
        let decomposer = QuestionDecomposer::new();
        for text in [
            "",
            "history of jazz",
            "hotel prices in Rome",
            "EV market growth",
            "Redis vs Memcached vs Valkey vs Dragonfly",
            "hotel prices in Rome vs Milan",
        ] {
            let len = decomposer.heuristic(&ResearchQuery::new(text)).len();
            assert!((2..=4).contains(&len), "{len} themes for {text:?}");
        }
    }

    #[test]
    fn test_heuristic_comparative_adds_sides() {
        let decomposer = QuestionDecomposer::new();
        let themes = decomposer.heuristic(&ResearchQuery::new("Redis vs Memcached"));
        assert_eq!(themes.len(), 4);
        assert!(themes[2].question.ends_with("redis"));
        assert!(themes[3].question.ends_with("memcached"));
        assert_eq!(themes[3].id, "t4");
    }
}
