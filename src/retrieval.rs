//! Category-scoped nearest-neighbor retrieval
//!
//! A query is embedded once and searched against the entries sharing its
//! score category. Categories with too few indexed entries fall back to the
//! full index. Query-time failures never propagate: they produce an empty,
//! degraded result so batch processing can continue.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::timeout;

use crate::Error;
use crate::cache::ResultCache;
use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::{Neighbor, ScopedIndex, VectorIndex};
use crate::knowledge::DefectRecord;
use crate::similarity::similarity;

/// A retrieved record and its squared L2 distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: DefectRecord,
    pub distance: f32,
}

/// Hits ordered by ascending distance
pub type SearchResult = Vec<SearchHit>;

/// Where a retrieval's hits came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// Blank query, nothing searched
    Skipped,
    /// Served from the result cache
    Cache,
    /// Searched the category's own entries
    Scoped,
    /// Category too sparse (or search degraded), searched the full index
    Global,
}

/// Outcome of one retrieval
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub hits: SearchResult,
    /// Embedding or search failed; `hits` is empty
    pub degraded: bool,
    pub source: RetrievalSource,
}

impl Retrieval {
    const fn empty(source: RetrievalSource, degraded: bool) -> Self {
        Self {
            hits: Vec::new(),
            degraded,
            source,
        }
    }

    /// Attach similarity percentages, most similar first
    #[must_use]
    pub fn rank(&self) -> Vec<RankedCase> {
        let mut ranked: Vec<RankedCase> = self
            .hits
            .iter()
            .map(|hit| RankedCase {
                record: hit.record.clone(),
                distance: hit.distance,
                similarity: similarity(hit.distance),
            })
            .collect();
        ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        ranked
    }
}

/// A retrieved case with its display similarity
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCase {
    pub record: DefectRecord,
    pub distance: f32,
    /// Percentage in (0, 100]
    pub similarity: f64,
}

/// An index together with the scoped views derived from it
///
/// Swapped as a unit so a memoized scope never outlives its index.
struct Snapshot {
    index: Arc<VectorIndex>,
    scopes: RwLock<HashMap<String, Arc<ScopedIndex>>>,
}

impl Snapshot {
    fn new(index: Arc<VectorIndex>) -> Self {
        Self {
            index,
            scopes: RwLock::new(HashMap::new()),
        }
    }

    /// Memoized scope for a category, derived outside the write lock
    async fn scope(&self, category: &str) -> Arc<ScopedIndex> {
        if let Some(scope) = self.scopes.read().await.get(category) {
            return Arc::clone(scope);
        }

        let built = Arc::new(self.index.scoped(category));
        tracing::debug!(category, entries = built.len(), "derived scoped index");

        let mut scopes = self.scopes.write().await;
        Arc::clone(scopes.entry(category.to_string()).or_insert(built))
    }
}

/// Retrieves the most similar historical defects for a query
pub struct Retriever {
    snapshot: RwLock<Arc<Snapshot>>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Option<ResultCache>,
    config: RetrievalConfig,
}

impl Retriever {
    /// Create a retriever over a built index
    #[must_use]
    pub fn new(
        index: VectorIndex,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Option<ResultCache>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::new(Arc::new(index)))),
            provider,
            cache,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[must_use]
    pub const fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Index currently served
    pub async fn index(&self) -> Arc<VectorIndex> {
        Arc::clone(&self.snapshot.read().await.index)
    }

    /// Swap in a freshly built index
    ///
    /// In-flight queries finish against the index they started with.
    /// Memoized scopes are discarded with the old index.
    pub async fn replace_index(&self, index: VectorIndex) {
        let entries = index.len();
        *self.snapshot.write().await = Arc::new(Snapshot::new(Arc::new(index)));
        tracing::info!(entries, "replaced vector index");
    }

    /// Number of categories with a memoized scope
    pub async fn memoized_scopes(&self) -> usize {
        let snapshot = Arc::clone(&*self.snapshot.read().await);
        snapshot.scopes.read().await.len()
    }

    /// Retrieve up to `min(k, top_k)` records closest to `query`
    ///
    /// Never fails: embedding errors, timeouts and search errors produce an
    /// empty result with `degraded` set.
    pub async fn retrieve(&self, query: &str, category: &str, k: usize) -> Retrieval {
        if query.trim().is_empty() || k == 0 {
            tracing::debug!("blank query, skipping retrieval");
            return Retrieval::empty(RetrievalSource::Skipped, false);
        }

        let category = category.trim();
        let limit = k.min(self.config.top_k);

        let key = self.cache.as_ref().map(|_| ResultCache::key(query, category, k));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(mut hits) = cache.get(key) {
                hits.truncate(limit);
                return Retrieval {
                    hits,
                    degraded: false,
                    source: RetrievalSource::Cache,
                };
            }
        }

        let snapshot = Arc::clone(&*self.snapshot.read().await);

        let vector = match timeout(self.config.embedding_timeout, self.provider.embed(query)).await
        {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "query embedding failed, continuing without context");
                return Retrieval::empty(RetrievalSource::Global, true);
            }
            Err(_) => {
                let e = Error::EmbeddingTimeout(self.config.embedding_timeout.as_secs());
                tracing::warn!(error = %e, "query embedding timed out, continuing without context");
                return Retrieval::empty(RetrievalSource::Global, true);
            }
        };

        let scope = snapshot.scope(category).await;
        let (neighbors, source) = if scope.len() < self.config.scope_threshold {
            tracing::debug!(
                category,
                scoped = scope.len(),
                threshold = self.config.scope_threshold,
                "category too sparse, searching full index"
            );
            (
                snapshot.index.search(&vector, self.config.candidate_count),
                RetrievalSource::Global,
            )
        } else {
            (
                snapshot
                    .index
                    .search_scoped(&scope, &vector, self.config.candidate_count),
                RetrievalSource::Scoped,
            )
        };

        let neighbors = match neighbors {
            Ok(neighbors) => neighbors,
            Err(e) => {
                tracing::warn!(error = %e, "search failed, continuing without context");
                return Retrieval::empty(source, true);
            }
        };

        let hits = to_hits(&snapshot.index, &neighbors, limit);
        tracing::debug!(category, hits = hits.len(), source = ?source, "retrieved similar defects");

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.set(key, &hits) {
                tracing::warn!(error = %e, "failed to cache retrieval result");
            }
        }

        Retrieval {
            hits,
            degraded: false,
            source,
        }
    }
}

fn to_hits(index: &VectorIndex, neighbors: &[Neighbor], limit: usize) -> SearchResult {
    neighbors
        .iter()
        .filter_map(|n| {
            index.get(n.position).map(|entry| SearchHit {
                record: entry.record.clone(),
                distance: n.distance,
            })
        })
        .take(limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::index::IndexedEntry;
    use crate::knowledge::DefectMetadata;
    use crate::Result;

    /// Returns a fixed query vector and counts calls
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                vector,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.vector.is_empty() {
                return Err(Error::Embedding("offline".to_string()));
            }
            Ok(self.vector.clone())
        }

        fn model(&self) -> &str {
            "fixed"
        }
    }

    fn entry(id: &str, category: &str, x: f32) -> IndexedEntry {
        IndexedEntry {
            record: DefectRecord {
                description: format!("defect {id}"),
                metadata: DefectMetadata {
                    id: id.to_string(),
                    score_category: category.to_string(),
                    ..DefectMetadata::default()
                },
            },
            vector: vec![x, 0.0],
        }
    }

    fn index(entries: Vec<IndexedEntry>) -> VectorIndex {
        VectorIndex::from_entries(entries).unwrap()
    }

    fn ids(retrieval: &Retrieval) -> Vec<&str> {
        retrieval.hits.iter().map(|h| h.record.id()).collect()
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let entries = (0..6_u8)
            .map(|i| entry(&format!("a{i}"), "A", f32::from(i)))
            .collect();
        let retriever = Retriever::new(
            index(entries),
            FixedEmbedder::new(vec![0.0, 0.0]),
            None,
            RetrievalConfig::default(),
        );

        let result = retriever.retrieve("query", "A", 8).await;
        assert_eq!(result.source, RetrievalSource::Scoped);
        assert_eq!(ids(&result), vec!["a0", "a1", "a2"]);

        let result = retriever.retrieve("query", "A", 2).await;
        assert_eq!(result.hits.len(), 2);
    }

    #[tokio::test]
    async fn blank_query_skips_embedding() {
        let provider = FixedEmbedder::new(vec![0.0, 0.0]);
        let retriever = Retriever::new(
            index(vec![entry("a", "A", 0.0)]),
            Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            None,
            RetrievalConfig::default(),
        );

        let result = retriever.retrieve("  \n ", "A", 8).await;
        assert!(result.hits.is_empty());
        assert!(!result.degraded);
        assert_eq!(result.source, RetrievalSource::Skipped);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedding_failure_degrades() {
        let retriever = Retriever::new(
            index(vec![entry("a", "A", 0.0)]),
            FixedEmbedder::new(Vec::new()),
            None,
            RetrievalConfig::default(),
        );

        let result = retriever.retrieve("query", "A", 8).await;
        assert!(result.hits.is_empty());
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn search_failure_degrades() {
        let retriever = Retriever::new(
            index(vec![entry("a", "A", 0.0)]),
            FixedEmbedder::new(vec![0.0, 0.0, 0.0]),
            None,
            RetrievalConfig::default(),
        );

        let result = retriever.retrieve("query", "A", 8).await;
        assert!(result.hits.is_empty());
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn scopes_are_memoized_and_dropped_on_replace() {
        let retriever = Retriever::new(
            index(vec![entry("a", "A", 0.0)]),
            FixedEmbedder::new(vec![0.0, 0.0]),
            None,
            RetrievalConfig::default(),
        );

        retriever.retrieve("q", "A", 3).await;
        retriever.retrieve("q", "A", 3).await;
        retriever.retrieve("q", "B", 3).await;
        assert_eq!(retriever.memoized_scopes().await, 2);

        retriever
            .replace_index(index(vec![entry("z", "A", 0.0)]))
            .await;
        assert_eq!(retriever.memoized_scopes().await, 0);
        assert_eq!(ids(&retriever.retrieve("q", "A", 3).await), vec!["z"]);
    }

    #[test]
    fn rank_orders_by_similarity() {
        let retrieval = Retrieval {
            hits: vec![
                SearchHit {
                    record: entry("near", "A", 0.0).record,
                    distance: 0.0,
                },
                SearchHit {
                    record: entry("far", "A", 0.0).record,
                    distance: 3.0,
                },
            ],
            degraded: false,
            source: RetrievalSource::Scoped,
        };

        let ranked = retrieval.rank();
        assert_eq!(ranked[0].record.id(), "near");
        assert!((ranked[0].similarity - 100.0).abs() < 1e-9);
        assert!((ranked[1].similarity - 25.0).abs() < 1e-9);
    }
}
