//! Before/after previews for file edits.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Proposed change carried by an `Edit` or `Write` tool input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileChange {
    Write {
        content: String,
    },
    Edit {
        old_string: String,
        new_string: String,
        #[serde(default)]
        replace_all: bool,
    },
}

impl FileChange {
    pub fn is_edit(&self) -> bool {
        matches!(self, Self::Edit { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreparedDiff {
    pub original_content: String,
    pub proposed_content: String,
    /// 1-based line of the first replaced occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edit_line_number: Option<usize>,
}

impl PreparedDiff {
    /// Apply `change` to `original`. `None` when an edit's target text is
    /// not present.
    pub fn from_change(original: &str, change: &FileChange) -> Option<Self> {
        match change {
            FileChange::Write { content } => Some(Self {
                original_content: original.to_string(),
                proposed_content: content.clone(),
                edit_line_number: None,
            }),
            FileChange::Edit {
                old_string,
                new_string,
                replace_all,
            } => {
                if old_string.is_empty() {
                    return original.is_empty().then(|| Self {
                        original_content: String::new(),
                        proposed_content: new_string.clone(),
                        edit_line_number: Some(1),
                    });
                }
                let offset = original.find(old_string.as_str())?;
                let proposed_content = if *replace_all {
                    original.replace(old_string.as_str(), new_string)
                } else {
                    original.replacen(old_string.as_str(), new_string, 1)
                };
                Some(Self {
                    original_content: original.to_string(),
                    proposed_content,
                    edit_line_number: Some(original[..offset].matches('\n').count() + 1),
                })
            }
        }
    }
}

/// Prepares and presents diff views.
#[async_trait]
pub trait DiffManager: Send + Sync {
    async fn prepare_diff(
        &self,
        tool_use_id: &str,
        tool_name: &str,
        file_path: &str,
        change: &FileChange,
    ) -> Option<PreparedDiff>;

    async fn show_diff_view(&self, tool_use_id: &str, file_path: &str, diff: &PreparedDiff);

    fn close_diff_view(&self, tool_use_id: &str);
}

/// Reads the target from disk and has no view of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDiffManager;

#[async_trait]
impl DiffManager for LocalDiffManager {
    async fn prepare_diff(
        &self,
        tool_use_id: &str,
        _tool_name: &str,
        file_path: &str,
        change: &FileChange,
    ) -> Option<PreparedDiff> {
        let original = match tokio::fs::read_to_string(Path::new(file_path)).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => {
                tracing::warn!(tool_use_id, file_path, error = %err, "could not read edit target");
                return None;
            }
        };
        PreparedDiff::from_change(&original, change)
    }

    async fn show_diff_view(&self, tool_use_id: &str, file_path: &str, _diff: &PreparedDiff) {
        tracing::debug!(tool_use_id, file_path, "diff prepared");
    }

    fn close_diff_view(&self, tool_use_id: &str) {
        tracing::trace!(tool_use_id, "diff closed");
    }
}
