//! Convenience re-exports for common use.

pub use crate::config::BridgeConfig;
pub use crate::engine::{
    event_channel, Collaborators, EngineEvent, EngineEventSink, EventFeed, QueryOutcome,
    TurnEngine,
};
pub use crate::error::{BridgeError, Result};
pub use crate::gate::{
    ConfirmHandler, ConfirmRequest, Decision, DiffManager, ToolGate, ToolUseContext, UiRequest,
    UiSink,
};
pub use crate::types::{
    ApprovalMode, ContentBlock, PermissionMode, PermissionResult, RuntimeEvent, Usage,
};
