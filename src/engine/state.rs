//! Accumulator state owned by one [`TurnEngine`](super::TurnEngine).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::EngineEvent;
use crate::types::{ContentBlock, Usage};

/// Continuation fired at most once.
pub type OneShot = Box<dyn FnOnce() + Send>;

/// Work produced under the state lock and delivered after it is released.
#[derive(Default)]
pub(crate) struct Outbox {
    pub(crate) events: Vec<EngineEvent>,
    pub(crate) callbacks: Vec<OneShot>,
}

impl Outbox {
    pub(crate) fn is_empty(&self) -> bool {
        self.events.is_empty() && self.callbacks.is_empty()
    }
}

/// Live content of the message currently streaming.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamingContent {
    pub message_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
    /// Untagged output accumulated so far.
    pub text: String,
    pub thinking: String,
    pub is_thinking: bool,
    pub thinking_started_at: Option<DateTime<Utc>>,
    pub thinking_duration_ms: Option<u64>,
    /// Byte length of `text` already committed into `content_blocks`.
    pub committed_text_length: usize,
    /// Ordered text and tool-use blocks.
    pub content_blocks: Vec<ContentBlock>,
    pub has_streamed_tools: bool,
}

impl StreamingContent {
    pub fn for_message(message_id: Option<String>, parent_tool_use_id: Option<String>) -> Self {
        Self {
            message_id,
            parent_tool_use_id,
            ..Self::default()
        }
    }

    pub fn uncommitted_text(&self) -> &str {
        self.text.get(self.committed_text_length..).unwrap_or_default()
    }

    /// Commit pending text as a discrete block, returning the committed chunk.
    pub fn commit_text(&mut self) -> Option<String> {
        let chunk = self.uncommitted_text().to_string();
        self.committed_text_length = self.text.len();
        if chunk.trim().is_empty() {
            return None;
        }
        self.content_blocks.push(ContentBlock::text(chunk.clone()));
        Some(chunk)
    }

    /// Returns true when thinking was not already in progress.
    pub fn start_thinking(&mut self) -> bool {
        if self.is_thinking {
            return false;
        }
        self.is_thinking = true;
        self.thinking_started_at = Some(Utc::now());
        self.thinking_duration_ms = None;
        true
    }

    /// End a thinking phase, returning its duration in milliseconds.
    pub fn finish_thinking(&mut self) -> Option<u64> {
        if !self.is_thinking {
            return None;
        }
        self.is_thinking = false;
        let started = self.thinking_started_at.take()?;
        let elapsed = (Utc::now() - started).num_milliseconds().max(0) as u64;
        self.thinking_duration_ms = Some(elapsed);
        Some(elapsed)
    }

    pub fn has_tool(&self, tool_use_id: &str) -> bool {
        self.content_blocks
            .iter()
            .any(|block| block.tool_use_id() == Some(tool_use_id))
    }
}

/// Finalized content of one assistant message, held until flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAssistantMessage {
    pub id: String,
    pub model: Option<String>,
    pub stop_reason: Option<String>,
    pub content: Vec<ContentBlock>,
    pub session_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
}

impl PendingAssistantMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: None,
            stop_reason: None,
            content: Vec::new(),
            session_id: None,
            parent_tool_use_id: None,
        }
    }

    pub fn has_tool(&self, tool_use_id: &str) -> bool {
        self.content
            .iter()
            .any(|block| block.tool_use_id() == Some(tool_use_id))
    }

    /// Append text to the trailing text block, or start one.
    pub fn merge_text(&mut self, text: &str) {
        match self.content.last_mut() {
            Some(ContentBlock::Text { text: existing }) => existing.push_str(text),
            _ => self.content.push(ContentBlock::text(text)),
        }
    }

    /// Append a block unless a tool block with the same id is present.
    pub fn push_unique(&mut self, block: ContentBlock) {
        if let Some(id) = block.tool_use_id() {
            if self.has_tool(id) {
                return;
            }
        }
        self.content.push(block);
    }

    pub fn last_is_tool(&self) -> bool {
        matches!(self.content.last(), Some(ContentBlock::ToolUse { .. }))
    }
}

/// Turn-scoped and session-scoped accumulator.
///
/// Observable changes are queued in an outbox that the engine drains after
/// releasing its lock.
#[derive(Default)]
pub struct AccumulatorState {
    generation: u64,
    session_id: Option<String>,
    processing: bool,
    silent_abort: bool,
    last_user_message_id: Option<String>,
    pub streaming: StreamingContent,
    pub pending: Option<PendingAssistantMessage>,
    session_usage: Usage,
    /// Message whose usage was last counted, with the totals from before it.
    usage_baseline: Option<(String, Usage)>,
    total_cost_usd: f64,
    context_window: Option<u64>,
    on_turn_complete: Option<OneShot>,
    on_turn_end_flush: Option<OneShot>,
    outbox: Outbox,
}

impl AccumulatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        tracing::debug!(generation = self.generation, "generation advanced");
        self.generation
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn set_session_id(&mut self, session_id: Option<String>) {
        if self.session_id == session_id {
            return;
        }
        self.session_id = session_id.clone();
        self.emit(EngineEvent::SessionChanged { session_id });
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn set_processing(&mut self, processing: bool) {
        if self.processing == processing {
            return;
        }
        self.processing = processing;
        self.emit(EngineEvent::ProcessingChanged { processing });
    }

    pub fn silent_abort(&self) -> bool {
        self.silent_abort
    }

    pub fn set_silent_abort(&mut self, silent: bool) {
        self.silent_abort = silent;
    }

    pub fn last_user_message_id(&self) -> Option<&str> {
        self.last_user_message_id.as_deref()
    }

    pub fn set_last_user_message_id(&mut self, id: Option<String>) {
        self.last_user_message_id = id;
    }

    /// Count one message's usage in the session totals.
    ///
    /// The runtime repeats a message's usage on every content-block event, so
    /// a repeated `message_id` replaces its earlier contribution.
    pub fn record_usage(&mut self, message_id: &str, usage: &Usage) -> &Usage {
        let baseline = match self.usage_baseline.take() {
            Some((id, before)) if id == message_id => before,
            _ => self.session_usage.clone(),
        };
        self.session_usage = baseline.clone();
        self.session_usage.merge(usage);
        self.usage_baseline = Some((message_id.to_string(), baseline));
        &self.session_usage
    }

    pub fn session_usage(&self) -> &Usage {
        &self.session_usage
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub(crate) fn set_total_cost_usd(&mut self, cost: f64) {
        self.total_cost_usd = cost;
    }

    /// Context window last reported by the runtime.
    pub fn context_window(&self) -> Option<u64> {
        self.context_window
    }

    pub(crate) fn set_context_window(&mut self, window: u64) {
        self.context_window = Some(window);
    }

    /// Replace the live streaming content with a fresh one for `message_id`.
    pub fn begin_streaming(
        &mut self,
        message_id: Option<String>,
        parent_tool_use_id: Option<String>,
    ) {
        self.streaming = StreamingContent::for_message(message_id, parent_tool_use_id);
    }

    /// Discard the turn and invalidate every consumer of the old generation.
    pub fn reset_streaming(&mut self) -> u64 {
        let generation = self.bump_generation();
        self.clear_turn();
        self.last_user_message_id = None;
        self.silent_abort = false;
        self.set_processing(false);
        generation
    }

    /// Clear turn-scoped fields between turns.
    pub fn reset_turn(&mut self) {
        self.clear_turn();
    }

    fn clear_turn(&mut self) {
        self.streaming = StreamingContent::default();
        self.pending = None;
    }

    pub fn set_on_turn_complete(&mut self, callback: OneShot) {
        self.on_turn_complete = Some(callback);
    }

    pub fn set_on_turn_end_flush(&mut self, callback: OneShot) {
        self.on_turn_end_flush = Some(callback);
    }

    /// Queue the turn-complete continuation; later calls are no-ops until a
    /// new one is registered.
    pub fn fire_turn_complete(&mut self) -> bool {
        match self.on_turn_complete.take() {
            Some(callback) => {
                self.outbox.callbacks.push(callback);
                true
            }
            None => false,
        }
    }

    pub fn fire_turn_end_flush(&mut self) -> bool {
        match self.on_turn_end_flush.take() {
            Some(callback) => {
                self.outbox.callbacks.push(callback);
                true
            }
            None => false,
        }
    }

    pub(crate) fn emit(&mut self, event: EngineEvent) {
        self.outbox.events.push(event);
    }

    pub(crate) fn take_outbox(&mut self) -> Outbox {
        std::mem::take(&mut self.outbox)
    }
}

impl std::fmt::Debug for AccumulatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccumulatorState")
            .field("generation", &self.generation)
            .field("session_id", &self.session_id)
            .field("processing", &self.processing)
            .field("silent_abort", &self.silent_abort)
            .field("last_user_message_id", &self.last_user_message_id)
            .field("streaming", &self.streaming)
            .field("pending", &self.pending)
            .field("has_turn_complete", &self.on_turn_complete.is_some())
            .finish_non_exhaustive()
    }
}
