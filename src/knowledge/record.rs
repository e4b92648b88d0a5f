//! Defect records as loaded from the knowledge base and as validated for indexing

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Provenance fields nested under a defect's `metadata` key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawProvenance {
    #[serde(default)]
    pub source: Option<Value>,
}

/// A defect entry exactly as it appears in the knowledge base file
///
/// Spreadsheet exports are loose about types, so every field is kept as a raw
/// JSON value until [`DefectRecord::from_raw`] validates it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDefect {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub defect_number: Option<Value>,
    #[serde(default)]
    pub title: Option<Value>,
    #[serde(default)]
    pub product_name: Option<Value>,
    #[serde(default)]
    pub work_order: Option<Value>,
    #[serde(default)]
    pub occurrence_probability: Option<Value>,
    #[serde(default)]
    pub defect_description: Option<Value>,
    #[serde(default)]
    pub score_category: Option<Value>,
    #[serde(default)]
    pub severity_level: Option<Value>,
    #[serde(default)]
    pub defect_type: Option<Value>,
    #[serde(default)]
    pub defect_scenario: Option<Value>,
    #[serde(default)]
    pub introduction_phase: Option<Value>,
    #[serde(default)]
    pub metadata: Option<RawProvenance>,
}

/// Categorical attributes carried alongside a defect description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectMetadata {
    pub id: String,
    pub defect_number: String,
    pub title: String,
    pub product_name: String,
    pub work_order: String,
    pub occurrence_probability: String,
    pub score_category: String,
    pub severity_level: String,
    pub defect_type: String,
    pub defect_scenario: String,
    pub introduction_phase: String,
    /// Where the defect was reported; retrieval-internal, never rendered
    pub source: String,
}

impl DefectMetadata {
    /// Fields that may be shown to the generation step, in display order
    ///
    /// Excludes `source`.
    #[must_use]
    pub fn display_fields(&self) -> [(&'static str, &str); 11] {
        [
            ("id", self.id.as_str()),
            ("defect_number", self.defect_number.as_str()),
            ("title", self.title.as_str()),
            ("product_name", self.product_name.as_str()),
            ("work_order", self.work_order.as_str()),
            ("occurrence_probability", self.occurrence_probability.as_str()),
            ("score_category", self.score_category.as_str()),
            ("severity_level", self.severity_level.as_str()),
            ("defect_type", self.defect_type.as_str()),
            ("defect_scenario", self.defect_scenario.as_str()),
            ("introduction_phase", self.introduction_phase.as_str()),
        ]
    }
}

/// A validated defect record, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectRecord {
    /// Description text, the primary retrieval key
    pub description: String,
    pub metadata: DefectMetadata,
}

impl DefectRecord {
    /// Validate a raw knowledge base entry
    ///
    /// `index` is the entry's position in the knowledge base and is only used
    /// for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `Error::RecordValidation` if the description is empty or any of
    /// `id`, `defect_number`, `title`, `product_name`, `metadata.source` is
    /// missing
    pub fn from_raw(index: usize, raw: &RawDefect) -> Result<Self> {
        let reject = |reason: String| Error::RecordValidation { index, reason };

        let description = scalar(raw.defect_description.as_ref())
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| reject("empty description".to_string()))?;

        let required = |value: Option<&Value>, name: &str| {
            scalar(value).ok_or_else(|| reject(format!("missing field `{name}`")))
        };

        let id = required(raw.id.as_ref(), "id")?;
        let defect_number = required(raw.defect_number.as_ref(), "defect_number")?;
        let product_name = required(raw.product_name.as_ref(), "product_name")?;
        let title = required(raw.title.as_ref(), "title")?;
        let source = required(
            raw.metadata.as_ref().and_then(|m| m.source.as_ref()),
            "metadata.source",
        )?;

        let optional = |value: Option<&Value>| scalar(value).unwrap_or_default();

        Ok(Self {
            description,
            metadata: DefectMetadata {
                id,
                defect_number,
                title,
                product_name,
                work_order: optional(raw.work_order.as_ref()),
                occurrence_probability: optional(raw.occurrence_probability.as_ref()),
                score_category: optional(raw.score_category.as_ref()),
                severity_level: optional(raw.severity_level.as_ref()),
                defect_type: optional(raw.defect_type.as_ref()),
                defect_scenario: optional(raw.defect_scenario.as_ref()),
                introduction_phase: optional(raw.introduction_phase.as_ref()),
                source,
            },
        })
    }

    /// Record identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    /// Score category used for scoped retrieval
    #[must_use]
    pub fn category(&self) -> &str {
        &self.metadata.score_category
    }
}

/// Render a loosely typed scalar as a string; null and containers count as absent
pub(crate) fn scalar(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
