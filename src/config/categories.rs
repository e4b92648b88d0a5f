//! Score category table
//!
//! Maps each score category value to the prompt template and display label
//! used for it. The table is validated once at startup; lookups never fail.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Category used when a query carries none
pub const DEFAULT_CATEGORY: &str = "功能使用";

/// Per-category behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProfile {
    /// Value as it appears in `score_category`
    pub value: String,
    /// Human-readable label
    pub label: String,
    /// System prompt template, relative to the prompt directory
    pub prompt_template: PathBuf,
}

impl CategoryProfile {
    fn new(value: &str, label: &str, prompt_template: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            prompt_template: PathBuf::from(prompt_template),
        }
    }
}

/// Validated, finite category table
#[derive(Debug, Clone)]
pub struct CategoryTable {
    profiles: Vec<CategoryProfile>,
    default_index: usize,
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            profiles: builtin_profiles(),
            default_index: 0,
        }
    }
}

fn builtin_profiles() -> Vec<CategoryProfile> {
    vec![
        CategoryProfile::new(DEFAULT_CATEGORY, "Functional usage", "sys.md"),
        CategoryProfile::new("体验良好", "User experience", "sys2.md"),
        CategoryProfile::new("性能效率", "Performance efficiency", "sys3.md"),
    ]
}

impl CategoryTable {
    /// Build and validate a category table
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the table is empty, a value is blank or
    /// duplicated, or `default_category` is not one of the values
    pub fn new(profiles: Vec<CategoryProfile>, default_category: &str) -> Result<Self> {
        if profiles.is_empty() {
            return Err(Error::Config("category table is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for profile in &profiles {
            let value = profile.value.trim();
            if value.is_empty() {
                return Err(Error::Config("category value must not be blank".to_string()));
            }
            if !seen.insert(value) {
                return Err(Error::Config(format!("duplicate category: {value}")));
            }
        }

        let default_index = profiles
            .iter()
            .position(|p| p.value.trim() == default_category.trim())
            .ok_or_else(|| {
                Error::Config(format!(
                    "default category '{default_category}' is not in the category table"
                ))
            })?;

        Ok(Self {
            profiles,
            default_index,
        })
    }

    /// Built-in table with a different default category
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the default is not a built-in category
    pub fn builtin(default_category: &str) -> Result<Self> {
        Self::new(builtin_profiles(), default_category)
    }

    /// Look up a category, falling back to the default profile
    ///
    /// Blank input resolves to the default silently; unknown values are logged.
    #[must_use]
    pub fn resolve(&self, category: &str) -> &CategoryProfile {
        let category = category.trim();
        if category.is_empty() {
            return self.default_profile();
        }

        if let Some(profile) = self.get(category) {
            return profile;
        }

        tracing::info!(category, "unknown score category, using default profile");
        self.default_profile()
    }

    /// Exact lookup
    #[must_use]
    pub fn get(&self, category: &str) -> Option<&CategoryProfile> {
        self.profiles.iter().find(|p| p.value.trim() == category)
    }

    #[must_use]
    pub fn default_profile(&self) -> &CategoryProfile {
        &self.profiles[self.default_index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryProfile> {
        self.profiles.iter()
    }
}
