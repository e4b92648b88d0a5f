//! Build a vector index from the knowledge base

use super::{IndexedEntry, VectorIndex};
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{DefectRecord, KnowledgeBase};
use crate::{Error, Result};

/// Outcome of an index build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Records embedded into the index
    pub indexed: usize,
    /// Knowledge base entries rejected by validation
    pub skipped: usize,
}

impl VectorIndex {
    /// Validate every knowledge base entry and embed the accepted ones
    ///
    /// Invalid entries are logged and skipped. Insertion order follows the
    /// knowledge base.
    ///
    /// # Errors
    ///
    /// Returns `Error::IndexBuild` if the provider fails for any accepted
    /// record or returns vectors of inconsistent dimension
    pub async fn build(
        knowledge: &KnowledgeBase,
        provider: &dyn EmbeddingProvider,
    ) -> Result<(Self, BuildReport)> {
        let mut entries = Vec::with_capacity(knowledge.len());
        let mut report = BuildReport::default();

        for (i, raw) in knowledge.iter().enumerate() {
            let record = match DefectRecord::from_raw(i, raw) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping defect record");
                    report.skipped += 1;
                    continue;
                }
            };

            let vector = provider.embed(&record.description).await.map_err(|e| {
                Error::IndexBuild(format!("embedding record {} failed: {e}", record.id()))
            })?;

            tracing::trace!(id = record.id(), dimension = vector.len(), "embedded record");
            entries.push(IndexedEntry { record, vector });
        }

        let index = Self::from_entries(entries)?;
        report.indexed = index.len();

        tracing::info!(
            indexed = report.indexed,
            skipped = report.skipped,
            dimension = index.dimension(),
            model = provider.model(),
            "vector index built"
        );

        Ok((index, report))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::knowledge::RawDefect;

    /// Embeds text as (length, vowel count)
    struct LengthEmbedder {
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            if self.fail_on.is_some_and(|f| text.contains(f)) {
                return Err(Error::Embedding("provider unavailable".to_string()));
            }
            #[allow(clippy::cast_precision_loss)]
            let vowels = text.chars().filter(|c| "aeiou".contains(*c)).count() as f32;
            #[allow(clippy::cast_precision_loss)]
            Ok(vec![text.len() as f32, vowels])
        }

        fn model(&self) -> &str {
            "length"
        }
    }

    fn defect(id: &str, description: &str) -> RawDefect {
        serde_json::from_value(json!({
            "id": id,
            "defect_number": format!("N-{id}"),
            "title": format!("title {id}"),
            "product_name": "Portal",
            "defect_description": description,
            "score_category": "功能使用",
            "metadata": {"source": "qa"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn invalid_records_are_skipped() {
        let kb = KnowledgeBase::from_records(vec![
            defect("a", "login fails"),
            defect("b", "   "),
            defect("c", "crash on save"),
        ]);
        let (index, report) = VectorIndex::build(&kb, &LengthEmbedder { fail_on: None })
            .await
            .unwrap();

        assert_eq!(report, BuildReport { indexed: 2, skipped: 1 });
        let ids: Vec<&str> = index.entries().iter().map(|e| e.record.id()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(index.dimension(), 2);
    }

    #[tokio::test]
    async fn provider_failure_aborts_build() {
        let kb = KnowledgeBase::from_records(vec![defect("a", "login fails"), defect("b", "boom")]);
        let err = VectorIndex::build(&kb, &LengthEmbedder { fail_on: Some("boom") })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::IndexBuild(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn empty_knowledge_base_builds_empty_index() {
        let kb = KnowledgeBase::from_records(Vec::new());
        let (index, report) = VectorIndex::build(&kb, &LengthEmbedder { fail_on: None })
            .await
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(report.indexed, 0);
    }
}
