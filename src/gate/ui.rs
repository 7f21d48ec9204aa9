//! Requests posted to the approval UI.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::util::{read, write};

/// Single `postMessage`-shaped callback into the UI layer.
pub type UiSink = Arc<dyn Fn(UiRequest) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiRequest {
    FileApproval {
        tool_use_id: String,
        tool_name: String,
        file_path: String,
        original_content: String,
        proposed_content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edit_line_number: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    BashApproval {
        tool_use_id: String,
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    Question {
        tool_use_id: String,
        questions: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    PlanEnter {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    PlanExit {
        tool_use_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        plan: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    SkillApproval {
        tool_use_id: String,
        skill: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_use_id: Option<String>,
    },
    /// A pending approval was resolved by sub-agent bulk approval.
    ApprovalAutoResolved {
        tool_use_id: String,
        parent_tool_use_id: String,
    },
    /// A pending request ended without a UI decision.
    RequestCancelled {
        tool_use_id: String,
    },
}

impl UiRequest {
    pub fn tool_use_id(&self) -> &str {
        match self {
            Self::FileApproval { tool_use_id, .. }
            | Self::BashApproval { tool_use_id, .. }
            | Self::Question { tool_use_id, .. }
            | Self::PlanEnter { tool_use_id, .. }
            | Self::PlanExit { tool_use_id, .. }
            | Self::SkillApproval { tool_use_id, .. }
            | Self::ApprovalAutoResolved { tool_use_id, .. }
            | Self::RequestCancelled { tool_use_id } => tool_use_id,
        }
    }
}

/// Replaceable slot holding the current UI sink.
#[derive(Default)]
pub struct UiChannel {
    sink: RwLock<Option<UiSink>>,
}

impl UiChannel {
    pub fn new(sink: Option<UiSink>) -> Self {
        Self {
            sink: RwLock::new(sink),
        }
    }

    pub fn set(&self, sink: Option<UiSink>) {
        *write(&self.sink) = sink;
    }

    pub fn is_available(&self) -> bool {
        read(&self.sink).is_some()
    }

    /// Post `request`; returns false when no sink is attached.
    pub fn post(&self, request: UiRequest) -> bool {
        let sink = read(&self.sink).clone();
        match sink {
            Some(sink) => {
                sink(request);
                true
            }
            None => {
                tracing::warn!(tool_use_id = request.tool_use_id(), "no UI sink attached");
                false
            }
        }
    }
}

impl std::fmt::Debug for UiChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiChannel")
            .field("available", &self.is_available())
            .finish()
    }
}
