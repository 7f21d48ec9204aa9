use serde::{Deserialize, Serialize};

use crate::types::ApprovalMode;

/// Answer to an approval, plan, or skill request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub approved: bool,
    #[serde(default)]
    pub approval_mode: ApprovalMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Decision {
    pub fn approve() -> Self {
        Self::approve_with(ApprovalMode::Manual)
    }

    /// Approve; `AcceptEdits` also stops asking for the same kind of action.
    pub fn approve_with(approval_mode: ApprovalMode) -> Self {
        Self {
            approved: true,
            approval_mode,
            feedback: None,
        }
    }

    pub fn reject(feedback: Option<String>) -> Self {
        Self {
            approved: false,
            approval_mode: ApprovalMode::Manual,
            feedback,
        }
    }
}
