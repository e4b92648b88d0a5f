//! Batch analysis preparation
//!
//! Runs retrieval, context assembly and prompt construction for a list of
//! defect queries. Rows are processed strictly in input order and no single
//! row can abort the batch.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::CategoryTable;
use crate::context::assemble;
use crate::prompt::{PromptPair, PromptTemplates};
use crate::retrieval::{RankedCase, RetrievalSource, Retriever};
use crate::{Error, Result};

/// One defect to analyze
///
/// Accepts both English keys and the spreadsheet's Chinese column names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefectQuery {
    #[serde(default, alias = "缺陷标题")]
    pub title: Option<String>,
    #[serde(default, alias = "缺陷描述")]
    pub description: String,
    #[serde(default, alias = "评分分类")]
    pub category: Option<String>,
}

/// Processing outcome of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Analyzed,
    Skipped,
}

/// Summary of a retrieved case for reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseSummary {
    pub id: String,
    pub defect_number: String,
    pub title: String,
    pub similarity: f64,
}

impl From<&RankedCase> for CaseSummary {
    fn from(case: &RankedCase) -> Self {
        let metadata = &case.record.metadata;
        Self {
            id: metadata.id.clone(),
            defect_number: metadata.defect_number.clone(),
            title: metadata.title.clone(),
            similarity: case.similarity,
        }
    }
}

/// Result for one input row
#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    /// Zero-based position in the input
    pub index: usize,
    pub status: RowStatus,
    pub title: String,
    pub description: String,
    pub category: String,
    pub category_label: String,
    pub cases: Vec<CaseSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RetrievalSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptPair>,
}

/// Prepares analysis prompts for batches of defects
pub struct BatchRunner {
    retriever: Arc<Retriever>,
    categories: CategoryTable,
    templates: PromptTemplates,
}

impl BatchRunner {
    #[must_use]
    pub const fn new(
        retriever: Arc<Retriever>,
        categories: CategoryTable,
        templates: PromptTemplates,
    ) -> Self {
        Self {
            retriever,
            categories,
            templates,
        }
    }

    /// Process queries in input order
    pub async fn run(&self, queries: &[DefectQuery]) -> Vec<BatchRow> {
        let total = queries.len();
        let mut rows = Vec::with_capacity(total);

        for (index, query) in queries.iter().enumerate() {
            tracing::info!(row = index + 1, total, "processing defect");
            rows.push(self.process(index, query).await);
        }

        let skipped = rows.iter().filter(|r| r.status == RowStatus::Skipped).count();
        let degraded = rows.iter().filter(|r| r.degraded).count();
        tracing::info!(total, skipped, degraded, "batch complete");

        rows
    }

    /// Process a single query
    pub async fn process(&self, index: usize, query: &DefectQuery) -> BatchRow {
        let title = query.title.as_deref().map(str::trim).unwrap_or_default();
        let description = query.description.trim();
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.categories.default_profile().value.as_str());
        let profile = self.categories.resolve(category);

        let mut row = BatchRow {
            index,
            status: RowStatus::Skipped,
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            category_label: profile.label.clone(),
            cases: Vec::new(),
            context: None,
            degraded: false,
            source: None,
            prompt: None,
        };

        if description.is_empty() {
            tracing::warn!(row = index + 1, "skipping defect with empty description");
            return row;
        }

        let k = self.retriever.config().candidate_count;
        let retrieval = self.retriever.retrieve(description, category, k).await;
        let ranked = retrieval.rank();
        let context = assemble(&ranked);

        for case in &ranked {
            tracing::debug!(
                row = index + 1,
                id = case.record.id(),
                similarity = case.similarity,
                "similar case"
            );
        }

        row.status = RowStatus::Analyzed;
        row.cases = ranked.iter().map(CaseSummary::from).collect();
        row.degraded = retrieval.degraded;
        row.source = Some(retrieval.source);
        row.prompt = Some(self.templates.build(profile, &context, title, description));
        row.context = Some(context);

        row
    }
}

/// Read batch input: a JSON array of queries
///
/// # Errors
///
/// Returns error if the file cannot be read or is not a query array
pub fn load_queries(path: &Path) -> Result<Vec<DefectQuery>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("failed to read batch input {}: {e}", path.display()))
    })?;
    let queries: Vec<DefectQuery> = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), rows = queries.len(), "loaded batch input");
    Ok(queries)
}

/// Write batch results as pretty JSON, creating parent directories
///
/// # Errors
///
/// Returns error if the output cannot be written
pub fn write_rows(path: &Path, rows: &[BatchRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(rows)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote batch results");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_accepts_spreadsheet_columns() {
        let queries: Vec<DefectQuery> = serde_json::from_str(
            r#"[
                {"缺陷标题": "闪退", "缺陷描述": "打开设置页闪退", "评分分类": "体验良好"},
                {"description": "slow list scroll"}
            ]"#,
        )
        .unwrap();

        assert_eq!(queries[0].title.as_deref(), Some("闪退"));
        assert_eq!(queries[0].category.as_deref(), Some("体验良好"));
        assert_eq!(queries[1].description, "slow list scroll");
        assert!(queries[1].category.is_none());
    }

    #[test]
    fn missing_description_deserializes_blank() {
        let query: DefectQuery = serde_json::from_str(r#"{"title": "x"}"#).unwrap();
        assert!(query.description.is_empty());
    }

    #[test]
    fn write_rows_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/results.json");
        write_rows(&path, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "[]");
    }
}
