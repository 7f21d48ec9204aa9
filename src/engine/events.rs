//! Events emitted by the turn engine to the presentation layer.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::types::{ContentBlock, McpServerStatus, ModelUsage, ResultSubtype, Role, Usage};

/// Callback receiving engine events.
///
/// Always invoked after the engine has released its state lock, so a sink may
/// call back into the engine.
pub type EngineEventSink = Arc<dyn Fn(EngineEvent) + Send + Sync>;

/// Kind of an incremental stream fragment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeltaKind {
    Text,
    Thinking,
}

/// Context-window occupancy after an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextUsage {
    pub context_tokens: u64,
    pub context_window: u64,
    /// Occupancy in percent, clamped to 100.
    pub percent_used: f64,
    /// Cumulative token counts for the session.
    pub session: Usage,
}

impl ContextUsage {
    pub fn new(context_tokens: u64, context_window: u64, session: Usage) -> Self {
        let percent_used = if context_window == 0 {
            0.0
        } else {
            (context_tokens as f64 / context_window as f64 * 100.0).min(100.0)
        };
        Self {
            context_tokens,
            context_window,
            percent_used,
            session,
        }
    }
}

/// A finalized assistant message, emitted exactly once per message id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub message_id: String,
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Summary of a completed turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnSummary {
    pub subtype: ResultSubtype,
    pub is_error: bool,
    pub total_cost_usd: f64,
    pub num_turns: u32,
    pub duration_ms: u64,
    pub context_window: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub model_usage: HashMap<String, ModelUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Events produced while accumulating one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    SessionChanged {
        session_id: Option<String>,
    },
    ProcessingChanged {
        processing: bool,
    },
    UsageUpdated {
        usage: ContextUsage,
    },
    ThinkingStarted {
        message_id: Option<String>,
    },
    ThinkingComplete {
        message_id: Option<String>,
        duration_ms: u64,
    },
    StreamDelta {
        message_id: Option<String>,
        kind: DeltaKind,
        text: String,
    },
    /// Current streaming block list after a tool use was streamed.
    ToolStreaming {
        message_id: Option<String>,
        blocks: Vec<ContentBlock>,
    },
    SessionInit {
        session_id: Option<String>,
        model: Option<String>,
        tools: Vec<String>,
        permission_mode: Option<String>,
        mcp_servers: Vec<McpServerStatus>,
    },
    SystemNotice {
        subtype: String,
        data: serde_json::Map<String, serde_json::Value>,
    },
    UserMessage {
        uuid: Option<String>,
        parent_tool_use_id: Option<String>,
        content: Vec<ContentBlock>,
    },
    AssistantMessage {
        message: AssistantMessage,
    },
    BudgetWarning {
        cost_usd: f64,
        limit_usd: f64,
        percent_used: u32,
    },
    BudgetExceeded {
        cost_usd: f64,
        limit_usd: f64,
    },
    Done {
        summary: TurnSummary,
    },
    Error {
        message: String,
    },
}
