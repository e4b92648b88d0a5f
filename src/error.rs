//! Error types for defect retrieval

use thiserror::Error;

/// Result type alias for defect retrieval operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or querying the defect index
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration or knowledge base error
    #[error("configuration error: {0}")]
    Config(String),

    /// A knowledge base record is missing a required field
    #[error("record {index} rejected: {reason}")]
    RecordValidation {
        /// Position of the record in the knowledge base
        index: usize,
        /// Why the record was rejected
        reason: String,
    },

    /// Embedding provider failure
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Index construction aborted by an embedding failure
    #[error("index build failed: {0}")]
    IndexBuild(String),

    /// Embedding provider did not answer in time
    #[error("embedding timed out after {0}s")]
    EmbeddingTimeout(u64),

    /// Cached entry could not be read back
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    /// Nearest-neighbor search failure
    #[error("search error: {0}")]
    Search(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error must stop processing before any query is served
    ///
    /// Only configuration failures and embedding failures during index
    /// construction are fatal
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Toml(_) | Self::IndexBuild(_))
    }
}
