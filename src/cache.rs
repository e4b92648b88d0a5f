//! Content-addressed, TTL-bounded cache of retrieval results
//!
//! Each entry is one JSON file named after its key. Entries are written to a
//! temporary file in the cache directory and renamed into place, so readers
//! see either the previous entry or the complete new one.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;
use crate::knowledge::{DefectMetadata, DefectRecord};
use crate::retrieval::SearchHit;
use crate::{Error, Result};

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Separates key components so ("a b", "c") and ("a", "b c") never collide
const KEY_SEPARATOR: char = '\u{1f}';

/// Deterministic key for a (query, category, k) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One cached (content, metadata, distance) triple
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedHit {
    content: String,
    metadata: DefectMetadata,
    distance: f64,
}

/// On-disk entry layout
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    created_at: DateTime<Utc>,
    results: Vec<CachedHit>,
}

/// File-backed result cache
#[derive(Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
    clock: Clock,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("dir", &self.dir)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ResultCache {
    /// Create a cache rooted at `dir`
    ///
    /// The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            clock: Arc::new(Utc::now),
        }
    }

    /// Create a cache from configuration, or `None` when caching is disabled
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.dir.clone(), config.ttl))
    }

    /// Replace the clock used for timestamps and expiry checks
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Derive the key for a query
    ///
    /// The query is trimmed, lowercased and has internal whitespace collapsed;
    /// the category is trimmed. Keys are stable across processes.
    #[must_use]
    pub fn key(query: &str, category: &str, k: usize) -> CacheKey {
        let query = query
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = Sha256::new();
        hasher.update(query.as_bytes());
        hasher.update(KEY_SEPARATOR.to_string().as_bytes());
        hasher.update(category.trim().as_bytes());
        hasher.update(KEY_SEPARATOR.to_string().as_bytes());
        hasher.update(k.to_string().as_bytes());

        CacheKey(hex::encode(hasher.finalize()))
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Look up a fresh entry
    ///
    /// Missing, expired and unreadable entries are all misses. Unreadable
    /// entries are deleted.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Vec<SearchHit>> {
        let path = self.entry_path(key);

        let entry = match read_entry(&path) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(key = %key, "cache miss");
                return None;
            }
            Err(Error::CacheCorruption(reason)) => {
                tracing::warn!(key = %key, reason = %reason, "corrupt cache entry, removing");
                remove_entry(&path);
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read cache entry");
                return None;
            }
        };

        if self.is_expired(&entry) {
            tracing::debug!(key = %key, created_at = %entry.created_at, "cache entry is stale");
            return None;
        }

        tracing::debug!(key = %key, results = entry.results.len(), "cache hit");
        Some(entry.results.into_iter().map(SearchHit::from).collect())
    }

    /// Store results under `key`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory or entry cannot be written
    pub fn set(&self, key: &CacheKey, results: &[SearchHit]) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;

        let entry = CacheEntry {
            created_at: (self.clock)(),
            results: results.iter().map(CachedHit::from).collect(),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &entry)?;
        tmp.flush()?;

        let path = self.entry_path(key);
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!(key = %key, path = %path.display(), "cached retrieval result");
        Ok(())
    }

    /// Delete every expired or unreadable entry
    ///
    /// Files other than `*.json` (such as in-flight temporary files) are left
    /// alone. Returns the number of entries removed by this call.
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory exists but cannot be listed
    pub fn clear_expired(&self) -> Result<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for dir_entry in entries {
            let path = match dir_entry {
                Ok(dir_entry) => dir_entry.path(),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read cache directory entry");
                    continue;
                }
            };
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            let stale = match read_entry(&path) {
                Ok(Some(entry)) => self.is_expired(&entry),
                // Deleted concurrently
                Ok(None) => false,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "unreadable cache entry");
                    true
                }
            };

            if stale && remove_entry(&path) {
                removed += 1;
            }
        }

        tracing::info!(removed, dir = %self.dir.display(), "cleared expired cache entries");
        Ok(removed)
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        // Timestamps in the future count as fresh
        (self.clock)()
            .signed_duration_since(entry.created_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl)
    }
}

/// Read and parse one entry; `Ok(None)` if the file does not exist
fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
            return Err(Error::CacheCorruption(format!("not UTF-8: {e}")));
        }
        Err(e) => return Err(e.into()),
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::CacheCorruption(e.to_string()))
}

/// Remove an entry file, returning whether this call deleted it
fn remove_entry(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove cache entry");
            false
        }
    }
}

impl From<&SearchHit> for CachedHit {
    fn from(hit: &SearchHit) -> Self {
        Self {
            content: hit.record.description.clone(),
            metadata: hit.record.metadata.clone(),
            distance: f64::from(hit.distance),
        }
    }
}

impl From<CachedHit> for SearchHit {
    #[allow(clippy::cast_possible_truncation)]
    fn from(hit: CachedHit) -> Self {
        Self {
            record: DefectRecord {
                description: hit.content,
                metadata: hit.metadata,
            },
            // Written from an f32, so this is exact
            distance: hit.distance as f32,
        }
    }
}
