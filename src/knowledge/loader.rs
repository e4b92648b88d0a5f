//! Knowledge base file loading

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use super::record::{DefectRecord, RawDefect, scalar};
use crate::{Error, Result};

/// Header block written by the spreadsheet converter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeBaseInfo {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_records: Option<usize>,
    #[serde(default)]
    pub schema_version: Option<String>,
}

/// Ordered, read-only collection of historical defect entries
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeBase {
    defects: Vec<RawDefect>,
    #[serde(default)]
    metadata: Option<KnowledgeBaseInfo>,
}

/// Summary of a loaded knowledge base
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeStats {
    pub total: usize,
    /// Entries that pass record validation
    pub indexable: usize,
    /// Entry count per `score_category` value (blank categories under "")
    pub per_category: BTreeMap<String, usize>,
}

impl KnowledgeBase {
    /// Load a knowledge base JSON file
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file is missing, unreadable, or malformed
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "knowledge base not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read knowledge base {}: {e}", path.display()))
        })?;

        let kb = Self::from_json_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })?;

        let info = kb.info();
        tracing::info!(
            path = %path.display(),
            records = kb.len(),
            version = info.and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
            "knowledge base loaded"
        );

        if let Some(declared) = info.and_then(|i| i.total_records) {
            if declared != kb.len() {
                tracing::warn!(
                    declared,
                    actual = kb.len(),
                    "knowledge base header disagrees with record count"
                );
            }
        }

        Ok(kb)
    }

    /// Parse a knowledge base from its JSON text
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the text is not a knowledge base document
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("malformed knowledge base: {e}")))
    }

    /// Build a knowledge base directly from entries
    #[must_use]
    pub const fn from_records(defects: Vec<RawDefect>) -> Self {
        Self {
            defects,
            metadata: None,
        }
    }

    /// Header block, if the file carried one
    #[must_use]
    pub const fn info(&self) -> Option<&KnowledgeBaseInfo> {
        self.metadata.as_ref()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.defects.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.defects.is_empty()
    }

    /// Entries in file order
    pub fn iter(&self) -> impl Iterator<Item = &RawDefect> {
        self.defects.iter()
    }

    /// Count entries per score category
    #[must_use]
    pub fn stats(&self) -> KnowledgeStats {
        let mut per_category = BTreeMap::new();
        let mut indexable = 0;
        for (i, defect) in self.defects.iter().enumerate() {
            if DefectRecord::from_raw(i, defect).is_ok() {
                indexable += 1;
            }
            let category = scalar(defect.score_category.as_ref()).unwrap_or_default();
            *per_category.entry(category).or_insert(0) += 1;
        }

        KnowledgeStats {
            total: self.defects.len(),
            indexable,
            per_category,
        }
    }
}
