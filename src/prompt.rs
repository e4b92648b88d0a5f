//! System and user prompt assembly for defect analysis

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::CategoryProfile;

/// System prompt used when a category's template cannot be read
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "你是一个专业的缺陷分析专家，请分析给定缺陷的可能原因和解决方案。";

/// The two turns sent to the generation model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Load a system prompt template, trimmed
///
/// A missing or unreadable file yields [`DEFAULT_SYSTEM_PROMPT`].
#[must_use]
pub fn load_system_prompt(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            tracing::debug!(path = %path.display(), "loaded system prompt");
            content.trim().to_string()
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "system prompt unavailable, using default"
            );
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}

/// Render the human turn for one defect
#[must_use]
pub fn build_user_message(context: &str, title: &str, description: &str, category: &str) -> String {
    format!(
        "请基于以下历史案例分析当前缺陷：\n\n{context}\n当前缺陷标题：\n{title}\n\n当前缺陷描述：\n{description}\n\n评分分类：{category}"
    )
}

/// Resolves category prompt templates against a base directory
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    base_dir: PathBuf,
}

impl PromptTemplates {
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Template path for a category
    #[must_use]
    pub fn path_for(&self, profile: &CategoryProfile) -> PathBuf {
        if profile.prompt_template.is_absolute() {
            profile.prompt_template.clone()
        } else {
            self.base_dir.join(&profile.prompt_template)
        }
    }

    /// System prompt for a category, falling back to the default prompt
    #[must_use]
    pub fn system_prompt(&self, profile: &CategoryProfile) -> String {
        load_system_prompt(&self.path_for(profile))
    }

    /// Build both turns for one defect
    #[must_use]
    pub fn build(
        &self,
        profile: &CategoryProfile,
        context: &str,
        title: &str,
        description: &str,
    ) -> PromptPair {
        PromptPair {
            system: self.system_prompt(profile),
            user: build_user_message(context, title, description, &profile.value),
        }
    }
}
