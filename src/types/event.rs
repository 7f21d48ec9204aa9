//! Events emitted by the remote agent runtime.
//!
//! Only the fields the engine reads are modelled; everything else in the
//! runtime's payloads is ignored on deserialization.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::{ContentBlock, UserContent};
use super::stream::RawStreamEvent;
use super::usage::{ModelUsage, Usage};

/// One event from the runtime, discriminated by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    Assistant(AssistantEvent),
    StreamEvent(PartialEvent),
    System(SystemEvent),
    User(UserEvent),
    Result(ResultEvent),
}

impl RuntimeEvent {
    /// Parse one JSON-encoded event.
    pub fn from_json(raw: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }
}

/// A finalized (or partially finalized) assistant message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantEvent {
    pub message: AssistantPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Set when the message belongs to a sub-agent turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantPayload {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Envelope around one incremental stream event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartialEvent {
    pub event: RawStreamEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
}

/// Session-level system event (`init` and friends).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemEvent {
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(
        default,
        rename = "permissionMode",
        alias = "permission_mode",
        skip_serializing_if = "Option::is_none"
    )]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Remaining fields, surfaced untouched for non-init subtypes.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SystemEvent {
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

/// Connection state of one externally-integrated tool server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerStatus {
    pub name: String,
    #[serde(default)]
    pub status: String,
}

/// A user-originated message, including tool results from the environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEvent {
    pub message: UserPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_tool_use_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UserPayload {
    #[serde(default)]
    pub content: UserContent,
}

/// How a turn terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    ErrorDuringExecution,
    ErrorMaxBudgetUsd,
    #[serde(other)]
    Other,
}

/// Terminal event of one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultEvent {
    pub subtype: ResultSubtype,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, rename = "modelUsage", alias = "model_usage")]
    pub model_usage: HashMap<String, ModelUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}
