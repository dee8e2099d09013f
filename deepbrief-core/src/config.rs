//! Configuration system for deepbrief.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/deepbrief/config.toml` and/or `.deepbrief/config.toml`
//! in the workspace directory.

use crate::budget::ProviderClass;
use crate::types::ResearchMode;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for a deepbrief engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepBriefConfig {
    pub budget: BudgetConfig,
    pub cache: CacheConfig,
    pub clustering: ClusteringConfig,
    pub synthesis: SynthesisConfig,
    pub providers: ProvidersConfig,
}

impl DeepBriefConfig {
    /// The budget profile that applies to runs in `mode`.
    pub fn budget_for(&self, mode: ResearchMode) -> &BudgetProfile {
        match mode {
            ResearchMode::Standard => &self.budget.standard,
            ResearchMode::Deep => &self.budget.deep,
        }
    }
}

/// Per-mode call ceilings and runtime caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub standard: BudgetProfile,
    pub deep: BudgetProfile,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            standard: BudgetProfile::default(),
            deep: BudgetProfile {
                max_search_calls: 32,
                max_answer_calls: 12,
                max_language_model_calls: 8,
                deadline_secs: 12 * 60,
                allow_premium_tier: true,
            },
        }
    }
}

/// Hard caps for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetProfile {
    pub max_search_calls: usize,
    pub max_answer_calls: usize,
    pub max_language_model_calls: usize,
    /// Wall-clock cap for the whole run, in seconds.
    pub deadline_secs: u64,
    /// Whether the `deep-research` answer tier may be used.
    pub allow_premium_tier: bool,
}

impl Default for BudgetProfile {
    fn default() -> Self {
        Self {
            max_search_calls: 16,
            max_answer_calls: 6,
            max_language_model_calls: 4,
            deadline_secs: 6 * 60,
            allow_premium_tier: false,
        }
    }
}

/// Storage backend behind the cache gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// Process-local map shared by every run of the engine.
    Memory,
    /// One JSON file per entry under the cache directory.
    Filesystem,
    /// Every lookup misses and nothing is written.
    Disabled,
}

/// Cache gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Root directory for the filesystem backend. Defaults to the platform cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub search_ttl_secs: u64,
    pub answer_ttl_secs: u64,
    pub language_model_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Filesystem,
            dir: None,
            search_ttl_secs: 7 * 24 * 60 * 60,
            answer_ttl_secs: 24 * 60 * 60,
            language_model_ttl_secs: 2 * 60 * 60,
        }
    }
}

impl CacheConfig {
    /// Time-to-live for entries of the given category.
    pub fn ttl_for(&self, class: ProviderClass) -> Duration {
        Duration::from_secs(match class {
            ProviderClass::Search => self.search_ttl_secs,
            ProviderClass::Answer => self.answer_ttl_secs,
            ProviderClass::LanguageModel => self.language_model_ttl_secs,
        })
    }

    /// Directory used by the filesystem backend.
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("dev", "deepbrief", "deepbrief")
                .map(|d| d.cache_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".cache"))
        })
    }
}

/// Clustering thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Below this many evidence items everything goes into one "General" cluster.
    pub min_evidence_for_model: usize,
    pub max_clusters: usize,
    /// Cluster count used by the even-chunking fallback.
    pub fallback_clusters: usize,
    /// Evidence items included in the clustering prompt.
    pub max_prompt_evidence: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_evidence_for_model: 15,
            max_clusters: 6,
            fallback_clusters: 4,
            max_prompt_evidence: 100,
        }
    }
}

/// Synthesis prompt sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Evidence items the restructure call may cite.
    pub max_citeable_evidence: usize,
    /// Paragraphs turned into findings by the narrative-segmentation tier.
    pub segmented_findings: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_citeable_evidence: 30,
            segmented_findings: 10,
        }
    }
}

/// Connection settings for the three providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub search: SearchProviderConfig,
    pub answer: AnswerProviderConfig,
    pub language_model: LanguageModelConfig,
}

impl ProvidersConfig {
    /// Default timeout for a call of `class`.
    pub fn timeout_for(&self, class: ProviderClass) -> Duration {
        Duration::from_secs(match class {
            ProviderClass::Search => self.search.timeout_secs,
            ProviderClass::Answer => self.answer.timeout_secs,
            ProviderClass::LanguageModel => self.language_model.timeout_secs,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Results requested per search call.
    pub max_results: usize,
}

impl Default for SearchProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key_env: "TAVILY_API_KEY".to_string(),
            timeout_secs: 30,
            max_results: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnswerProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
    /// Timeout for the `deep-research` tier, which can take minutes.
    pub deep_timeout_secs: u64,
    pub temperature: f32,
}

impl Default for AnswerProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.perplexity.ai".to_string(),
            api_key_env: "PERPLEXITY_API_KEY".to_string(),
            timeout_secs: 60,
            deep_timeout_secs: 600,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageModelConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Optional `HTTP-Referer` attribution header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Optional `X-Title` attribution header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_title: Option<String>,
}

impl Default for LanguageModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            model: "google/gemini-2.5-flash".to_string(),
            timeout_secs: 90,
            referer: None,
            app_title: None,
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DEEPBRIEF_`)
/// 3. Workspace-local config (`.deepbrief/config.toml`)
/// 4. User config (`~/.config/deepbrief/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DeepBriefConfig>,
) -> Result<DeepBriefConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DeepBriefConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "deepbrief", "deepbrief") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".deepbrief").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DEEPBRIEF_BUDGET__STANDARD__MAX_SEARCH_CALLS, DEEPBRIEF_CACHE__BACKEND, ...
    figment = figment.merge(Env::prefixed("DEEPBRIEF_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load configuration from an explicit TOML file layered over the defaults.
pub fn load_config_file(path: &Path) -> Result<DeepBriefConfig, Box<figment::Error>> {
    Figment::from(Serialized::defaults(DeepBriefConfig::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEEPBRIEF_").split("__"))
        .extract()
        .map_err(Box::new)
}
