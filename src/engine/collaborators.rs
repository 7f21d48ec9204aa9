//! External collaborators the engine reports to.
//!
//! Implementations are called while the engine holds its state lock and
//! must not call back into the [`TurnEngine`](super::TurnEngine).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A tool invocation announced by the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamedToolInfo {
    pub name: String,
    pub input: serde_json::Value,
    pub message_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
}

/// Correlation data queued by tool name until the gate sees the invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueuedToolInfo {
    pub tool_use_id: String,
    pub parent_tool_use_id: Option<String>,
}

/// Tracks the lifecycle of streamed tool invocations.
pub trait ToolTracker: Send + Sync {
    fn register_streamed_tool(&self, tool_use_id: &str, info: StreamedToolInfo);

    fn queue_tool_info(&self, tool_name: &str, info: QueuedToolInfo);

    fn streamed_tool_info(&self, tool_use_id: &str) -> Option<StreamedToolInfo>;

    /// Mark tools streamed under `message_id` that never ran as abandoned.
    fn send_abandoned_tools(&self, message_id: &str);

    /// Mark every outstanding tool as abandoned.
    fn send_all_abandoned_tools(&self);

    fn reset_turn(&self);

    /// A tool result arrived from the environment.
    fn handle_tool_result(
        &self,
        _tool_use_id: &str,
        _content: &serde_json::Value,
        _is_error: bool,
    ) {
    }
}

/// Links assistant messages to user messages and accumulates spend.
pub trait CheckpointTracker: Send + Sync {
    fn track_checkpoint(&self, assistant_message_id: &str, user_message_id: &str);

    fn update_cost(&self, total_cost_usd: f64);
}

/// Tracker that ignores every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracker;

impl ToolTracker for NoopTracker {
    fn register_streamed_tool(&self, _tool_use_id: &str, _info: StreamedToolInfo) {}
    fn queue_tool_info(&self, _tool_name: &str, _info: QueuedToolInfo) {}
    fn streamed_tool_info(&self, _tool_use_id: &str) -> Option<StreamedToolInfo> {
        None
    }
    fn send_abandoned_tools(&self, _message_id: &str) {}
    fn send_all_abandoned_tools(&self) {}
    fn reset_turn(&self) {}
}

impl CheckpointTracker for NoopTracker {
    fn track_checkpoint(&self, _assistant_message_id: &str, _user_message_id: &str) {}
    fn update_cost(&self, _total_cost_usd: f64) {}
}

/// Collaborators shared by every processor.
#[derive(Clone)]
pub struct Collaborators {
    pub tool_tracker: Arc<dyn ToolTracker>,
    pub checkpoints: Arc<dyn CheckpointTracker>,
}

impl Collaborators {
    pub fn new(
        tool_tracker: Arc<dyn ToolTracker>,
        checkpoints: Arc<dyn CheckpointTracker>,
    ) -> Self {
        Self {
            tool_tracker,
            checkpoints,
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::new(Arc::new(NoopTracker), Arc::new(NoopTracker))
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
