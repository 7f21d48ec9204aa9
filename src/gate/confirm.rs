//! Modal confirmation for tools no policy recognizes.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::types::PermissionResult;

use super::approval::REQUEST_CANCELLED;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmRequest {
    pub id: String,
    pub tool_name: String,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

impl ConfirmRequest {
    pub fn new(
        tool_use_id: Option<&str>,
        tool_name: &str,
        input: &serde_json::Value,
        parent_tool_use_id: Option<String>,
    ) -> Self {
        Self {
            id: tool_use_id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string),
            tool_name: tool_name.to_string(),
            input: input.clone(),
            parent_tool_use_id,
        }
    }
}

/// Async yes/no prompt supplied by the host.
pub type ConfirmHandler = Arc<dyn Fn(ConfirmRequest) -> BoxFuture<'static, bool> + Send + Sync>;

pub async fn confirm(
    handler: Option<ConfirmHandler>,
    request: ConfirmRequest,
    cancel: &CancellationToken,
) -> PermissionResult {
    let Some(handler) = handler else {
        tracing::warn!(tool_name = %request.tool_name, "no confirmation handler; denying");
        return PermissionResult::deny(format!(
            "No confirmation handler is available for tool {}",
            request.tool_name
        ));
    };
    let tool_name = request.tool_name.clone();
    let input = request.input.clone();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => PermissionResult::interrupt(REQUEST_CANCELLED),
        approved = handler(request) => {
            if approved {
                PermissionResult::allow(input)
            } else {
                PermissionResult::interrupt(format!(
                    "The user denied permission to use {tool_name}"
                ))
            }
        }
    }
}
