//! TOML configuration.
//!
//! Every section has defaults, so a file containing only `[db]` is a valid
//! configuration. API keys are never stored in the file: the file names the
//! environment variables that hold them, and [`Secrets::from_env`] reads
//! those once at startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub relevance: RelevanceConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/notefeed.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_embedding_dims")]
    pub dims: usize,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_embedding_model(),
            dims: default_embedding_dims(),
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            timeout_secs: default_provider_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_embedding_dims() -> usize {
    1536
}
fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_provider_timeout_secs() -> u64 {
    30
}
fn default_max_input_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default = "default_completion_model")]
    pub model: String,
    #[serde(default = "default_anthropic_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: default_completion_model(),
            api_key_env: default_anthropic_key_env(),
            base_url: default_anthropic_base_url(),
            api_version: default_api_version(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_completion_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_anthropic_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}
fn default_api_version() -> String {
    "2023-06-01".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default = "default_cjk_threshold")]
    pub cjk_threshold: f64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_language: default_target_language(),
            cjk_threshold: default_cjk_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_target_language() -> String {
    "Japanese".to_string()
}
fn default_cjk_threshold() -> f64 {
    0.3
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Environment variable holding the bearer secret for the cron trigger.
    #[serde(default = "default_cron_secret_env")]
    pub cron_secret_env: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            cron_secret_env: default_cron_secret_env(),
        }
    }
}

fn default_retention_days() -> i64 {
    7
}
fn default_cron_secret_env() -> String {
    "CRON_SECRET".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            window_hours: default_window_hours(),
            limit: default_feed_limit(),
        }
    }
}

fn default_window_hours() -> i64 {
    48
}
fn default_feed_limit() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelevanceConfig {
    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_popularity_weight")]
    pub popularity_weight: f64,
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,
    #[serde(default = "default_popularity_cap")]
    pub popularity_cap: f64,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            similarity_weight: default_similarity_weight(),
            recency_weight: default_recency_weight(),
            popularity_weight: default_popularity_weight(),
            half_life_hours: default_half_life_hours(),
            popularity_cap: default_popularity_cap(),
        }
    }
}

fn default_similarity_weight() -> f64 {
    0.7
}
fn default_recency_weight() -> f64 {
    0.2
}
fn default_popularity_weight() -> f64 {
    0.1
}
fn default_half_life_hours() -> f64 {
    24.0
}
fn default_popularity_cap() -> f64 {
    500.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default = "default_match_count")]
    pub match_count: usize,
    #[serde(default = "default_chat_threshold")]
    pub chat_threshold: f64,
    #[serde(default = "default_chat_count")]
    pub chat_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            match_threshold: default_match_threshold(),
            match_count: default_match_count(),
            chat_threshold: default_chat_threshold(),
            chat_count: default_chat_count(),
        }
    }
}

fn default_chunk_size() -> usize {
    500
}
fn default_match_threshold() -> f64 {
    0.3
}
fn default_match_count() -> usize {
    10
}
fn default_chat_threshold() -> f64 {
    0.25
}
fn default_chat_count() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    #[serde(default)]
    pub hackernews: HackerNewsConfig,
    #[serde(default)]
    pub devto: DevtoConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HackerNewsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_hn_base_url")]
    pub base_url: String,
    #[serde(default = "default_hn_max_items")]
    pub max_items: usize,
    /// Number of top-story ids examined per fetch.
    #[serde(default = "default_hn_scan_limit")]
    pub scan_limit: usize,
    /// Item requests in flight at once.
    #[serde(default = "default_hn_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_connector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_hn_base_url(),
            max_items: default_hn_max_items(),
            scan_limit: default_hn_scan_limit(),
            batch_size: default_hn_batch_size(),
            timeout_secs: default_connector_timeout_secs(),
        }
    }
}

fn default_hn_base_url() -> String {
    "https://hacker-news.firebaseio.com/v0".to_string()
}
fn default_hn_max_items() -> usize {
    15
}
fn default_hn_scan_limit() -> usize {
    200
}
fn default_hn_batch_size() -> usize {
    10
}
fn default_connector_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DevtoConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_devto_base_url")]
    pub base_url: String,
    #[serde(default = "default_devto_max_items")]
    pub max_items: usize,
    #[serde(default = "default_devto_tags")]
    pub tags: Vec<String>,
    /// Dev.to `top` window in days.
    #[serde(default = "default_devto_top_days")]
    pub top_days: u32,
    #[serde(default = "default_devto_per_page")]
    pub per_page: u32,
    #[serde(default = "default_connector_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DevtoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_devto_base_url(),
            max_items: default_devto_max_items(),
            tags: default_devto_tags(),
            top_days: default_devto_top_days(),
            per_page: default_devto_per_page(),
            timeout_secs: default_connector_timeout_secs(),
        }
    }
}

fn default_devto_base_url() -> String {
    "https://dev.to/api".to_string()
}
fn default_devto_max_items() -> usize {
    10
}
fn default_devto_tags() -> Vec<String> {
    ["ai", "machinelearning", "llm", "openai", "deeplearning", "gpt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_devto_top_days() -> u32 {
    7
}
fn default_devto_per_page() -> u32 {
    10
}

impl Config {
    /// All defaults, with providers disabled. Used by tests and by commands
    /// that can run without a config file.
    pub fn minimal() -> Self {
        Self::default()
    }
}

/// Credentials read from the environment once at startup.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub embedding_api_key: Option<String>,
    pub completion_api_key: Option<String>,
    pub cron_secret: Option<String>,
}

impl Secrets {
    pub fn from_env(config: &Config) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            embedding_api_key: read(&config.embedding.api_key_env),
            completion_api_key: read(&config.completion.api_key_env),
            cron_secret: read(&config.ingest.cron_secret_env),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.embedding.max_input_chars == 0 {
        anyhow::bail!("embedding.max_input_chars must be > 0");
    }

    match config.completion.provider.as_str() {
        "disabled" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or anthropic.",
            other
        ),
    }

    if !(0.0..=1.0).contains(&config.translation.cjk_threshold) {
        anyhow::bail!("translation.cjk_threshold must be in [0.0, 1.0]");
    }

    if config.ingest.retention_days < 1 {
        anyhow::bail!("ingest.retention_days must be >= 1");
    }

    if config.feed.window_hours < 1 {
        anyhow::bail!("feed.window_hours must be >= 1");
    }
    if config.feed.limit == 0 {
        anyhow::bail!("feed.limit must be >= 1");
    }

    let r = &config.relevance;
    for (name, w) in [
        ("similarity_weight", r.similarity_weight),
        ("recency_weight", r.recency_weight),
        ("popularity_weight", r.popularity_weight),
    ] {
        if w < 0.0 {
            anyhow::bail!("relevance.{} must be >= 0", name);
        }
    }
    if r.similarity_weight + r.recency_weight + r.popularity_weight <= 0.0 {
        anyhow::bail!("relevance weights must not all be zero");
    }

    if config.search.chunk_size == 0 {
        anyhow::bail!("search.chunk_size must be > 0");
    }
    for (name, t) in [
        ("match_threshold", config.search.match_threshold),
        ("chat_threshold", config.search.chat_threshold),
    ] {
        if !(-1.0..=1.0).contains(&t) {
            anyhow::bail!("search.{} must be in [-1.0, 1.0]", name);
        }
    }

    if config.connectors.hackernews.batch_size == 0 {
        anyhow::bail!("connectors.hackernews.batch_size must be >= 1");
    }

    Ok(())
}
