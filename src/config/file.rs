//! TOML configuration file loading
//!
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

use super::categories::CategoryProfile;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Knowledge base JSON path
    #[serde(default)]
    pub knowledge_base: Option<PathBuf>,

    /// Directory prompt templates are resolved against
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,

    /// Category used when a query has none or an unknown one
    #[serde(default)]
    pub default_category: Option<String>,

    #[serde(default)]
    pub retrieval: RetrievalFileConfig,

    #[serde(default)]
    pub cache: CacheFileConfig,

    #[serde(default)]
    pub embedding: EmbeddingFileConfig,

    /// Replaces the built-in category table when present
    #[serde(default)]
    pub categories: Option<Vec<CategoryProfile>>,
}

/// Retrieval tuning
#[derive(Debug, Default, Deserialize)]
pub struct RetrievalFileConfig {
    pub candidate_count: Option<usize>,
    pub top_k: Option<usize>,
    pub scope_threshold: Option<usize>,
    pub embedding_timeout_secs: Option<u64>,
}

/// Result cache settings
#[derive(Debug, Default, Deserialize)]
pub struct CacheFileConfig {
    pub enabled: Option<bool>,
    pub dir: Option<PathBuf>,
    pub ttl_hours: Option<u64>,
}

/// Embedding endpoint settings
#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingFileConfig {
    /// Base URL of an OpenAI-compatible API (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl ConfigFile {
    /// Parse a configuration file body
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is invalid
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
