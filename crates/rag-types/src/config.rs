//! Configuration loading for the chat backend.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/rag-chat/config.toml.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RagError;
use crate::retrieval::ConfidenceLevel;

/// Wall-clock age (ms) after which a cached episode is stale. Not configurable.
pub const STALENESS_MS: i64 = 300_000;

/// Level -> score table for confidence assessments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScores {
    #[serde(default = "default_high_score")]
    pub high: f32,

    #[serde(default = "default_medium_score")]
    pub medium: f32,

    #[serde(default = "default_low_score")]
    pub low: f32,
}

fn default_high_score() -> f32 {
    0.9
}

fn default_medium_score() -> f32 {
    0.7
}

fn default_low_score() -> f32 {
    0.4
}

impl Default for ConfidenceScores {
    fn default() -> Self {
        Self {
            high: default_high_score(),
            medium: default_medium_score(),
            low: default_low_score(),
        }
    }
}

impl ConfidenceScores {
    /// Score for a level; unrecognized levels score as MEDIUM.
    pub fn score_for(&self, level: &ConfidenceLevel) -> f32 {
        match level {
            ConfidenceLevel::High => self.high,
            ConfidenceLevel::Medium => self.medium,
            ConfidenceLevel::Low => self.low,
            ConfidenceLevel::Other(_) => self.medium,
        }
    }
}

/// Settings for the retrieval decision and augmentation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    /// Scores strictly above this reuse the cache; scores strictly below
    /// it trigger web search.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Episodes older than this many turns are stale.
    #[serde(default = "default_max_context_age")]
    pub max_context_age: usize,

    /// Maximum cached episodes per session.
    #[serde(default = "default_max_retrieval_history")]
    pub max_retrieval_history: usize,

    /// Documents requested from the vector index.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Web results merged into the context.
    #[serde(default = "default_web_search_results")]
    pub web_search_results: usize,

    /// TTL for the cached retrieval state of a session.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    #[serde(default)]
    pub confidence_scores: ConfidenceScores,
}

fn default_confidence_threshold() -> f32 {
    0.7
}

fn default_max_context_age() -> usize {
    5
}

fn default_max_retrieval_history() -> usize {
    5
}

fn default_top_k() -> usize {
    5
}

fn default_web_search_results() -> usize {
    5
}

fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            max_context_age: default_max_context_age(),
            max_retrieval_history: default_max_retrieval_history(),
            top_k: default_top_k(),
            web_search_results: default_web_search_results(),
            session_ttl_secs: default_session_ttl_secs(),
            confidence_scores: ConfidenceScores::default(),
        }
    }
}

impl RetrievalSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be 0.0-1.0, got {}",
                self.confidence_threshold
            ));
        }
        let scores = &self.confidence_scores;
        for (name, score) in [("high", scores.high), ("medium", scores.medium), ("low", scores.low)] {
            if !(0.0..=1.0).contains(&score) {
                return Err(format!("confidence_scores.{} must be 0.0-1.0, got {}", name, score));
            }
        }
        if self.max_retrieval_history == 0 {
            return Err("max_retrieval_history must be > 0".to_string());
        }
        if self.top_k == 0 {
            return Err("top_k must be > 0".to_string());
        }
        Ok(())
    }
}

/// Conversational model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider name ("openai" or "anthropic")
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-4o-mini", "claude-3-haiku-20240307")
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Token budget for conversation history in the answer prompt
    #[serde(default = "default_history_token_budget")]
    pub history_token_budget: usize,
}

fn default_llm_provider() -> String {
    "openai".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_history_token_budget() -> usize {
    2000
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            api_key: None,
            api_base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: default_max_retries(),
            history_token_budget: default_history_token_budget(),
        }
    }
}

/// Web search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Search API key; absent means every search returns nothing
    #[serde(default)]
    pub api_key: Option<String>,

    /// Search engine id (Google Programmable Search "cx")
    #[serde(default)]
    pub engine_id: Option<String>,

    #[serde(default = "default_websearch_base_url")]
    pub base_url: String,

    #[serde(default = "default_websearch_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_websearch_base_url() -> String {
    "https://www.googleapis.com".to_string()
}

fn default_websearch_timeout_secs() -> u64 {
    10
}

impl Default for WebSearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            engine_id: None,
            base_url: default_websearch_base_url(),
            timeout_secs: default_websearch_timeout_secs(),
        }
    }
}

/// Embedding API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            api_key: None,
            api_base_url: None,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Directory holding the vector index
    #[serde(default = "default_index_path")]
    pub index_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retrieval: RetrievalSettings,

    #[serde(default)]
    pub llm: LlmSettings,

    #[serde(default)]
    pub websearch: WebSearchSettings,

    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "rag-chat")
}

fn default_db_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_index_path() -> String {
    project_dirs()
        .map(|p| p.data_local_dir().join("vector-index"))
        .unwrap_or_else(|| PathBuf::from("./vector-index"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            index_path: default_index_path(),
            log_level: default_log_level(),
            retrieval: RetrievalSettings::default(),
            llm: LlmSettings::default(),
            websearch: WebSearchSettings::default(),
            embedding: EmbeddingSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/rag-chat/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RAG_*, nested sections separated by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RagError> {
        let config_dir = project_dirs()
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| RagError::Config(e.to_string()))?
            .set_default("index_path", default_index_path())
            .map_err(|e| RagError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| RagError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: RAG_DB_PATH, RAG_LLM__API_KEY, RAG_RETRIEVAL__TOP_K, etc.
        builder = builder.add_source(
            Environment::with_prefix("RAG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| RagError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate all sections.
    pub fn validate(&self) -> Result<(), RagError> {
        self.retrieval
            .validate()
            .map_err(|e| RagError::Config(format!("retrieval: {}", e)))
    }

    /// Copy of the settings with API keys masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.llm.api_key = mask(&self.llm.api_key);
        copy.websearch.api_key = mask(&self.websearch.api_key);
        copy.embedding.api_key = mask(&self.embedding.api_key);
        copy
    }

    /// Expand ~ in db_path to the home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    /// Expand ~ in index_path to the home directory
    pub fn expanded_index_path(&self) -> PathBuf {
        expand_home(&self.index_path)
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(base) = directories::BaseDirs::new() {
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.llm.provider, "openai");
        assert_eq!(settings.retrieval.top_k, 5);
        assert!((settings.retrieval.confidence_threshold - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_default_confidence_table() {
        let scores = ConfidenceScores::default();
        assert!((scores.score_for(&ConfidenceLevel::High) - 0.9).abs() < f32::EPSILON);
        assert!((scores.score_for(&ConfidenceLevel::Medium) - 0.7).abs() < f32::EPSILON);
        assert!((scores.score_for(&ConfidenceLevel::Low) - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_retrieval_validation() {
        let mut retrieval = RetrievalSettings::default();
        assert!(retrieval.validate().is_ok());

        retrieval.confidence_threshold = 1.5;
        assert!(retrieval.validate().is_err());

        retrieval.confidence_threshold = 0.7;
        retrieval.max_retrieval_history = 0;
        assert!(retrieval.validate().is_err());

        retrieval.max_retrieval_history = 3;
        retrieval.confidence_scores.low = -0.1;
        assert!(retrieval.validate().is_err());
    }

    #[test]
    fn test_load_from_cli_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "log_level = \"debug\"\n[retrieval]\ntop_k = 8\nmax_context_age = 2\n[llm]\nprovider = \"anthropic\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.retrieval.top_k, 8);
        assert_eq!(settings.retrieval.max_context_age, 2);
        assert_eq!(settings.retrieval.max_retrieval_history, 5);
        assert_eq!(settings.llm.provider, "anthropic");
    }

    #[test]
    fn test_staleness_bound_cannot_be_overridden() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[retrieval]\nstaleness_ms = 3600000\ntop_k = 3").unwrap();

        let settings = Settings::load(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(settings.retrieval.top_k, 3);
        let rendered = serde_json::to_string(&settings.retrieval).unwrap();
        assert!(!rendered.contains("staleness"));
        assert_eq!(STALENESS_MS, 300_000);
    }

    #[test]
    fn test_load_rejects_invalid_threshold() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[retrieval]\nconfidence_threshold = 2.0").unwrap();

        let result = Settings::load(Some(file.path().to_str().unwrap()));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_redacted_masks_keys() {
        let mut settings = Settings::default();
        settings.llm.api_key = Some("sk-secret".to_string());
        let redacted = settings.redacted();
        assert_eq!(redacted.llm.api_key.as_deref(), Some("********"));
        assert!(redacted.websearch.api_key.is_none());
    }
}
