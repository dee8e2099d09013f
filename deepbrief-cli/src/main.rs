//! DeepBrief CLI: run one evidence research pipeline from the terminal.

mod commands;
mod progress;
mod run;

use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// DeepBrief: cited research briefs from web evidence
#[derive(Parser, Debug)]
#[command(name = "deepbrief", version, about, long_about = None)]
struct Cli {
    /// Research question (required unless a subcommand is given)
    query: Option<String>,

    /// Use the deep budget profile
    #[arg(long)]
    deep: bool,

    /// Only keep evidence published on or after this date (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    from: Option<NaiveDate>,

    /// Only keep evidence published on or before this date (YYYY-MM-DD)
    #[arg(long, value_name = "YYYY-MM-DD")]
    to: Option<NaiveDate>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
    format: OutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Clear the response cache before running
    #[arg(long)]
    clear_cache: bool,

    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress and non-essential output
    #[arg(short, long)]
    quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OutputFormat {
    Markdown,
    Json,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Manage the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum CacheAction {
    /// Remove cached provider responses
    Clear {
        /// Only clear one provider category
        #[arg(long, value_enum)]
        category: Option<CacheCategory>,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CacheCategory {
    Search,
    Answer,
    LanguageModel,
}

impl From<CacheCategory> for deepbrief_core::ProviderClass {
    fn from(category: CacheCategory) -> Self {
        match category {
            CacheCategory::Search => Self::Search,
            CacheCategory::Answer => Self::Answer,
            CacheCategory::LanguageModel => Self::LanguageModel,
        }
    }
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "deepbrief", "deepbrief")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "deepbrief.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let config = match &cli.config {
        Some(path) => deepbrief_core::config::load_config_file(path),
        None => deepbrief_core::load_config(Some(&workspace), None),
    }
    .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace, &config).await;
    }

    let Some(query) = cli.query else {
        anyhow::bail!("No query given. Run `deepbrief \"<question>\"` or see `deepbrief --help`.");
    };

    let args = run::RunArgs {
        query,
        deep: cli.deep,
        from: cli.from,
        to: cli.to,
        format: cli.format,
        output: cli.output,
        clear_cache: cli.clear_cache,
        quiet: cli.quiet,
    };
    run::run_research(args, config).await
}
