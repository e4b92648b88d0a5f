//! Configuration management for defect retrieval

mod categories;
pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub use categories::{CategoryProfile, CategoryTable, DEFAULT_CATEGORY};
use file::ConfigFile;

use crate::{Error, Result};

/// Defect retrieval configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the knowledge base JSON
    pub knowledge_base: PathBuf,

    /// Directory prompt templates are resolved against
    pub prompt_dir: PathBuf,

    /// Retrieval tuning
    pub retrieval: RetrievalConfig,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Embedding endpoint settings
    pub embedding: EmbeddingConfig,

    /// Validated score category table
    pub categories: CategoryTable,
}

/// Retrieval tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Candidates requested from the nearest-neighbor search before truncation
    pub candidate_count: usize,

    /// Cases surfaced downstream
    pub top_k: usize,

    /// Scoped indices smaller than this fall back to the full index
    pub scope_threshold: usize,

    /// Per-query embedding timeout
    pub embedding_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_count: 8,
            top_k: 3,
            scope_threshold: 5,
            embedding_timeout: Duration::from_secs(30),
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Consult and populate the cache
    pub enabled: bool,

    /// Directory holding one JSON file per cache key
    pub dir: PathBuf,

    /// Maximum entry age
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Embedding endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,

    /// Embedding model identifier
    pub model: String,

    /// API key (from `EMBEDDING_API_KEY` or `OPENAI_API_KEY`)
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            knowledge_base: PathBuf::from("defects_knowledge_base.json"),
            prompt_dir: PathBuf::from("."),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            categories: CategoryTable::default(),
        }
    }
}

/// Return the cache directory for retrieval results
///
/// Uses `~/.cache/defect-rag/results` on Linux
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "omni", "defect-rag").map_or_else(
        || PathBuf::from(".cache/results"),
        |d| d.cache_dir().join("results"),
    )
}

impl Config {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is missing or invalid, or the
    /// resulting configuration fails validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Load configuration with an explicit environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is missing or invalid, or the
    /// resulting configuration fails validation
    pub fn load_with_env(
        path: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let file = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("failed to read config {}: {e}", path.display()))
                })?;
                let file = ConfigFile::parse(&content)?;
                tracing::info!(path = %path.display(), "loaded config file");
                file
            }
            None => ConfigFile::default(),
        };

        let mut config = Self::from_file(file)?;
        config.apply_env(env)?;
        config.validate()?;

        Ok(config)
    }

    /// Overlay a parsed config file on the defaults
    ///
    /// # Errors
    ///
    /// Returns error if the category table is invalid
    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let default_category = file
            .default_category
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
        let categories = match file.categories {
            Some(profiles) => CategoryTable::new(profiles, &default_category)?,
            None => CategoryTable::builtin(&default_category)?,
        };

        let retrieval = RetrievalConfig {
            candidate_count: file
                .retrieval
                .candidate_count
                .unwrap_or(defaults.retrieval.candidate_count),
            top_k: file.retrieval.top_k.unwrap_or(defaults.retrieval.top_k),
            scope_threshold: file
                .retrieval
                .scope_threshold
                .unwrap_or(defaults.retrieval.scope_threshold),
            embedding_timeout: file
                .retrieval
                .embedding_timeout_secs
                .map_or(defaults.retrieval.embedding_timeout, Duration::from_secs),
        };

        let cache = CacheConfig {
            enabled: file.cache.enabled.unwrap_or(defaults.cache.enabled),
            dir: file.cache.dir.unwrap_or(defaults.cache.dir),
            ttl: file
                .cache
                .ttl_hours
                .map_or(defaults.cache.ttl, hours_to_duration),
        };

        let embedding = EmbeddingConfig {
            base_url: file.embedding.base_url.unwrap_or(defaults.embedding.base_url),
            model: file.embedding.model.unwrap_or(defaults.embedding.model),
            api_key: file.embedding.api_key,
        };

        Ok(Self {
            knowledge_base: file.knowledge_base.unwrap_or(defaults.knowledge_base),
            prompt_dir: file.prompt_dir.unwrap_or(defaults.prompt_dir),
            retrieval,
            cache,
            embedding,
            categories,
        })
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = env("DEFECT_RAG_KNOWLEDGE_BASE") {
            self.knowledge_base = PathBuf::from(path);
        }
        if let Some(dir) = env("DEFECT_RAG_PROMPT_DIR") {
            self.prompt_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env("DEFECT_RAG_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
        if let Some(hours) = env("DEFECT_RAG_CACHE_TTL_HOURS") {
            let hours: u64 = hours.trim().parse().map_err(|_| {
                Error::Config(format!("DEFECT_RAG_CACHE_TTL_HOURS is not a number: {hours}"))
            })?;
            self.cache.ttl = hours_to_duration(hours);
        }
        if let Some(url) = env("EMBEDDING_BASE_URL") {
            self.embedding.base_url = url;
        }
        if let Some(model) = env("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(key) = env("EMBEDDING_API_KEY").or_else(|| env("OPENAI_API_KEY")) {
            self.embedding.api_key = Some(key);
        }

        Ok(())
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        let r = &self.retrieval;
        if r.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if r.candidate_count < r.top_k {
            return Err(Error::Config(format!(
                "retrieval.candidate_count ({}) must be >= top_k ({})",
                r.candidate_count, r.top_k
            )));
        }
        if r.embedding_timeout.is_zero() {
            return Err(Error::Config(
                "retrieval.embedding_timeout_secs must be positive".to_string(),
            ));
        }
        if self.cache.ttl.is_zero() {
            return Err(Error::Config("cache.ttl_hours must be positive".to_string()));
        }

        Ok(())
    }
}

const fn hours_to_duration(hours: u64) -> Duration {
    Duration::from_secs(hours.saturating_mul(60 * 60))
}
