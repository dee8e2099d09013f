//! # DeepBrief Core
//!
//! Core library for the deepbrief research pipeline.
//! Provides query decomposition, budgeted evidence gathering, deduplication,
//! clustering, contradiction analysis, cited report synthesis, the provider
//! contracts with their HTTP clients, the response cache and configuration.

pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod persistence;
pub mod providers;
pub mod research;
pub mod types;

// Re-export commonly used types at the crate root.
pub use budget::{CallCounts, ProviderClass, RunBudget};
pub use cache::{CacheGateway, CacheStore};
pub use config::{DeepBriefConfig, load_config};
pub use error::{CallError, DeepBriefError, Result};
pub use providers::{AnswerProvider, LanguageModel, ProviderSet, SearchProvider};
pub use research::{ResearchCallback, ResearchEngine, ResearchOutcome, ResearchPhase};
pub use types::{
    Citation, Confidence, DateWindow, Evidence, EvidenceCluster, KeyFinding, Report,
    ReportSection, ResearchMode, ResearchQuery, RetrievalStrategy, RunMeta, SynthesisTier, Theme,
};
