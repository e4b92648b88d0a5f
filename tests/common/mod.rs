//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use defect_rag::{EmbeddingProvider, Error, KnowledgeBase, RawDefect, Result, VectorIndex};
use serde_json::json;

/// Embedding provider driven by a keyword table
///
/// The vector of the first keyword contained in the text is returned; text
/// matching no keyword gets the fallback vector.
pub struct FakeEmbedder {
    keywords: Vec<(String, Vec<f32>)>,
    fallback: Vec<f32>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl FakeEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            keywords: Vec::new(),
            fallback,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: None,
        }
    }

    #[must_use]
    pub fn with(mut self, keyword: &str, vector: Vec<f32>) -> Self {
        self.keywords.push((keyword.to_string(), vector));
        self
    }

    /// Sleep before every answer
    #[must_use]
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Embedding("fake provider offline".to_string()));
        }

        Ok(self
            .keywords
            .iter()
            .find(|(keyword, _)| text.contains(keyword.as_str()))
            .map_or_else(|| self.fallback.clone(), |(_, vector)| vector.clone()))
    }

    fn model(&self) -> &str {
        "fake"
    }
}

/// A complete knowledge base entry
pub fn defect(id: &str, category: &str, description: &str) -> RawDefect {
    serde_json::from_value(json!({
        "id": id,
        "defect_number": format!("DN-{id}"),
        "title": format!("Defect {id}"),
        "product_name": "Portal",
        "defect_description": description,
        "score_category": category,
        "severity_level": "major",
        "metadata": { "source": "regression suite" }
    }))
    .expect("valid defect json")
}

/// Description used for a record; the fake embedder keys on it
pub fn description_of(id: &str) -> String {
    format!("case {id} misbehaves")
}

/// Records placed on the x axis: `(id, category, x)`
///
/// Returns the knowledge base and an embedder mapping each record to
/// `[x, 0.0]` and any text containing "query" to the origin.
pub fn layout(points: &[(&str, &str, f32)]) -> (KnowledgeBase, Arc<FakeEmbedder>) {
    let mut embedder = FakeEmbedder::new(vec![100.0, 100.0]).with("query", vec![0.0, 0.0]);
    let mut defects = Vec::with_capacity(points.len());

    for (id, category, x) in points {
        let description = description_of(id);
        embedder = embedder.with(&description, vec![*x, 0.0]);
        defects.push(defect(id, category, &description));
    }

    (KnowledgeBase::from_records(defects), Arc::new(embedder))
}

/// Build an index over a laid-out knowledge base
pub async fn build_index(kb: &KnowledgeBase, embedder: &FakeEmbedder) -> VectorIndex {
    let (index, _) = VectorIndex::build(kb, embedder)
        .await
        .expect("index build");
    index
}
