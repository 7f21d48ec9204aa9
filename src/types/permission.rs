//! Permission modes and the answer returned to the runtime for each tool use.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Session-wide permission mode.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default, Display, EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum PermissionMode {
    #[default]
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// Approval mode chosen by the user when accepting a plan or a skill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ApprovalMode {
    /// Approve and do not ask again for this kind of action.
    AcceptEdits,
    #[default]
    Manual,
}

/// Decision handed back to the runtime before a tool executes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "behavior", rename_all = "camelCase")]
pub enum PermissionResult {
    #[serde(rename_all = "camelCase")]
    Allow { updated_input: serde_json::Value },
    #[serde(rename_all = "camelCase")]
    Deny {
        message: String,
        /// Stop the turn instead of continuing with the denial in context.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        interrupt: bool,
    },
}

impl PermissionResult {
    pub fn allow(updated_input: serde_json::Value) -> Self {
        Self::Allow { updated_input }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: false,
        }
    }

    pub fn interrupt(message: impl Into<String>) -> Self {
        Self::Deny {
            message: message.into(),
            interrupt: true,
        }
    }

    /// Deny with the user's feedback when present, otherwise interrupt with
    /// `fallback`.
    pub fn rejected(feedback: Option<String>, fallback: &str) -> Self {
        match feedback.filter(|text| !text.trim().is_empty()) {
            Some(feedback) => Self::deny(feedback),
            None => Self::interrupt(fallback),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Self::Deny { interrupt: true, .. })
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Deny { message, .. } => Some(message),
            Self::Allow { .. } => None,
        }
    }

    pub fn updated_input(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Allow { updated_input } => Some(updated_input),
            Self::Deny { .. } => None,
        }
    }
}
