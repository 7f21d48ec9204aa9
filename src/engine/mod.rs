//! Turn reconstruction engine.
//!
//! Accumulates streamed text, thinking, and tool-use fragments into finalized
//! assistant messages and tracks the turn lifecycle.

pub mod collaborators;
pub mod events;
pub mod feed;
pub mod processors;
pub mod state;
mod turn;

pub use collaborators::{
    CheckpointTracker, Collaborators, NoopTracker, QueuedToolInfo, StreamedToolInfo, ToolTracker,
};
pub use events::{
    AssistantMessage, ContextUsage, DeltaKind, EngineEvent, EngineEventSink, TurnSummary,
};
pub use feed::{event_channel, EventFeed};
pub use state::{AccumulatorState, PendingAssistantMessage, StreamingContent};
pub use turn::{QueryOutcome, TurnEngine};
