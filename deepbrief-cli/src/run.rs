//! One-shot research run: build the engine, run the query, emit the report.

use crate::OutputFormat;
use crate::progress::StderrProgress;
use chrono::NaiveDate;
use deepbrief_core::{
    DateWindow, DeepBriefConfig, ResearchEngine, ResearchMode, ResearchOutcome, ResearchQuery,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Arguments for a single research run, as parsed from the command line.
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub query: String,
    pub deep: bool,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub clear_cache: bool,
    pub quiet: bool,
}

impl RunArgs {
    /// Validate the arguments and turn them into a pipeline query.
    pub fn to_query(&self) -> anyhow::Result<ResearchQuery> {
        let text = self.query.trim();
        if text.is_empty() {
            anyhow::bail!("Query must not be empty");
        }
        if let (Some(from), Some(to)) = (self.from, self.to)
            && from > to
        {
            anyhow::bail!("--from ({from}) is after --to ({to})");
        }
        let mode = if self.deep {
            ResearchMode::Deep
        } else {
            ResearchMode::Standard
        };
        Ok(ResearchQuery::new(text)
            .with_mode(mode)
            .with_window(DateWindow::new(self.from, self.to)))
    }
}

pub async fn run_research(args: RunArgs, config: DeepBriefConfig) -> anyhow::Result<()> {
    let query = args.to_query()?;
    let engine = ResearchEngine::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize providers: {}", e))?;

    if args.clear_cache {
        let removed = engine.cache().clear(None)?;
        info!(removed, "Cache cleared before run");
    }

    let progress = Arc::new(StderrProgress::new(args.quiet));
    let outcome = engine.run(&query, Some(progress)).await;

    let body = render_output(&outcome, args.format)?;
    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &body)?;
            if !args.quiet {
                eprintln!("Report written to {}", path.display());
            }
        }
        None => println!("{body}"),
    }

    if !args.quiet {
        eprintln!("{}", summary_line(&outcome));
    }
    Ok(())
}

/// Serialize the outcome in the requested format.
pub fn render_output(outcome: &ResearchOutcome, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Markdown => Ok(outcome.markdown.clone()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&serde_json::json!({
            "report": outcome.report,
            "markdown": outcome.markdown,
            "meta": outcome.meta,
        }))?),
    }
}

fn summary_line(outcome: &ResearchOutcome) -> String {
    let meta = &outcome.meta;
    let mut line = format!(
        "{} mode, {} sources, {} citations, synthesis {}, {} calls ({} cached), {:.1}s",
        meta.mode,
        meta.evidence,
        meta.citations,
        meta.tier,
        meta.calls.total(),
        meta.cache_hits,
        meta.elapsed_ms as f64 / 1000.0
    );
    if meta.terminated_early {
        line.push_str(", terminated early");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepbrief_core::cache::CacheGateway;
    use deepbrief_core::providers::{
        MockAnswerProvider, MockLanguageModel, MockSearchProvider, ProviderSet, SearchHit,
    };
    use pretty_assertions::assert_eq;

    fn args(query: &str) -> RunArgs {
        RunArgs {
            query: query.to_string(),
            deep: false,
            from: None,
            to: None,
            format: OutputFormat::Markdown,
            output: None,
            clear_cache: false,
            quiet: true,
        }
    }

    async fn outcome() -> ResearchOutcome {
        let providers = ProviderSet::new(
            Arc::new(MockSearchProvider::with_hits(vec![
                SearchHit::new("https://a.example/1").titled("A"),
            ])),
            Arc::new(MockAnswerProvider::new()),
            Arc::new(MockLanguageModel::new()),
        );
        let engine = ResearchEngine::new(
            DeepBriefConfig::default(),
            Arc::new(CacheGateway::disabled()),
            providers,
        );
        engine
            .run(&ResearchQuery::new("history of the printing press"), None)
            .await
    }

    #[test]
    fn test_to_query_applies_mode_and_window() {
        let mut a = args("  fusion power  ");
        a.deep = true;
        a.from = NaiveDate::from_ymd_opt(2024, 1, 1);
        let query = a.to_query().unwrap();

        assert_eq!(query.text, "fusion power");
        assert_eq!(query.mode, ResearchMode::Deep);
        assert_eq!(query.window.from, NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(query.window.to, None);
    }

    #[test]
    fn test_to_query_rejects_empty_and_inverted_window() {
        assert!(args("   ").to_query().is_err());

        let mut a = args("q");
        a.from = NaiveDate::from_ymd_opt(2024, 6, 1);
        a.to = NaiveDate::from_ymd_opt(2024, 1, 1);
        assert!(a.to_query().is_err());
    }

    #[tokio::test]
    async fn test_render_output_json_carries_report_and_meta() {
        let outcome = outcome().await;
        let json: serde_json::Value =
            serde_json::from_str(&render_output(&outcome, OutputFormat::Json).unwrap()).unwrap();

        assert_eq!(json["markdown"], outcome.markdown);
        assert_eq!(json["meta"]["evidence"], 1);
        assert!(json["report"]["executive_summary"].is_string());
    }

    #[tokio::test]
    async fn test_render_output_markdown_is_rendered_report() {
        let outcome = outcome().await;
        let body = render_output(&outcome, OutputFormat::Markdown).unwrap();
        assert!(body.starts_with("# Research Brief"));
        assert!(summary_line(&outcome).contains("1 sources"));
    }
}
