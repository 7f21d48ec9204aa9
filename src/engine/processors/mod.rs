//! Per-category event processors.
//!
//! Each processor borrows the accumulator for the duration of one runtime
//! event. Processors never fail: malformed or unexpected input is skipped.

mod assistant;
mod result;
mod stream_delta;
mod system;
mod user;

pub use assistant::process_assistant;
pub use result::{process_result, ResultContext};
pub use stream_delta::process_stream_event;
pub use system::process_system;
pub use user::process_user;

use super::collaborators::Collaborators;
use super::events::{AssistantMessage, EngineEvent};
use super::state::{AccumulatorState, PendingAssistantMessage, StreamingContent};
use crate::config::BridgeConfig;
use crate::types::{ContentBlock, Role, RuntimeEvent};

/// Borrowed view handed to every processor.
pub struct ProcessorContext<'a> {
    pub state: &'a mut AccumulatorState,
    pub collaborators: &'a Collaborators,
    pub config: &'a BridgeConfig,
}

impl<'a> ProcessorContext<'a> {
    pub fn new(
        state: &'a mut AccumulatorState,
        collaborators: &'a Collaborators,
        config: &'a BridgeConfig,
    ) -> Self {
        Self {
            state,
            collaborators,
            config,
        }
    }

    /// Emit the pending assistant message, if any. Returns whether anything
    /// was emitted.
    pub fn flush_pending_assistant(&mut self) -> bool {
        let Some(mut pending) = self.state.pending.take() else {
            return false;
        };

        if let Some(user_message_id) = self.state.last_user_message_id() {
            self.collaborators
                .checkpoints
                .track_checkpoint(&pending.id, user_message_id);
        }
        self.collaborators
            .tool_tracker
            .send_abandoned_tools(&pending.id);

        if self.state.streaming.message_id.as_deref() == Some(pending.id.as_str()) {
            backfill(&mut pending, &self.state.streaming);
        }

        tracing::debug!(
            message_id = %pending.id,
            blocks = pending.content.len(),
            "flushing assistant message"
        );
        self.state.emit(EngineEvent::AssistantMessage {
            message: AssistantMessage {
                message_id: pending.id,
                role: Role::Assistant,
                content: pending.content,
                model: pending.model,
                stop_reason: pending.stop_reason,
                parent_tool_use_id: pending.parent_tool_use_id,
                session_id: pending.session_id,
            },
        });
        true
    }

    /// Bind streaming content to `message_id`, flushing a different pending
    /// message first.
    pub(crate) fn open_message(&mut self, message_id: &str, parent_tool_use_id: Option<String>) {
        let pending_differs = self
            .state
            .pending
            .as_ref()
            .is_some_and(|pending| pending.id != message_id);
        if pending_differs {
            self.flush_pending_assistant();
            self.state
                .begin_streaming(Some(message_id.to_string()), parent_tool_use_id);
            return;
        }

        match self.state.streaming.message_id.as_deref() {
            None => {
                self.state.streaming.message_id = Some(message_id.to_string());
                self.state.streaming.parent_tool_use_id = parent_tool_use_id;
            }
            Some(current) if current != message_id => {
                self.state
                    .begin_streaming(Some(message_id.to_string()), parent_tool_use_id);
            }
            Some(_) => {}
        }
    }

    pub(crate) fn finish_thinking(&mut self) {
        if let Some(duration_ms) = self.state.streaming.finish_thinking() {
            let message_id = self.state.streaming.message_id.clone();
            self.state.emit(EngineEvent::ThinkingComplete {
                message_id,
                duration_ms,
            });
        }
    }
}

/// Recover output captured after the message was finalized.
fn backfill(pending: &mut PendingAssistantMessage, streaming: &StreamingContent) {
    if !streaming.thinking.trim().is_empty()
        && !pending.content.iter().any(ContentBlock::is_thinking)
    {
        pending
            .content
            .insert(0, ContentBlock::thinking(streaming.thinking.clone()));
    }

    let trailing = streaming.uncommitted_text();
    if trailing.trim().is_empty() {
        return;
    }
    let after_last_tool = pending
        .content
        .iter()
        .rposition(|block| matches!(block, ContentBlock::ToolUse { .. }))
        .map_or(0, |index| index + 1);
    if !pending.content[after_last_tool..].iter().any(ContentBlock::is_text) {
        pending.content.push(ContentBlock::text(trailing));
    }
}

/// Route one runtime event to its processor.
pub fn process(event: RuntimeEvent, ctx: &mut ProcessorContext<'_>, result_ctx: ResultContext) {
    match event {
        RuntimeEvent::Assistant(event) => process_assistant(event, ctx),
        RuntimeEvent::StreamEvent(event) => process_stream_event(event, ctx),
        RuntimeEvent::System(event) => process_system(event, ctx),
        RuntimeEvent::User(event) => process_user(event, ctx),
        RuntimeEvent::Result(event) => process_result(event, ctx, result_ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain_messages(state: &mut AccumulatorState) -> Vec<AssistantMessage> {
        state
            .take_outbox()
            .events
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::AssistantMessage { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn flush_is_idempotent() {
        let mut state = AccumulatorState::new();
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        state.pending = Some(PendingAssistantMessage::new("msg_1"));

        let mut ctx = ProcessorContext::new(&mut state, &collaborators, &config);
        assert!(ctx.flush_pending_assistant());
        assert!(!ctx.flush_pending_assistant());
        assert_eq!(drain_messages(&mut state).len(), 1);
    }

    #[test]
    fn flush_backfills_late_thinking_and_text() {
        let mut state = AccumulatorState::new();
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        let mut pending = PendingAssistantMessage::new("msg_1");
        pending.content.push(ContentBlock::tool_use("toolu_1", "Read", serde_json::json!({})));
        state.pending = Some(pending);
        state.begin_streaming(Some("msg_1".into()), None);
        state.streaming.thinking.push_str("considering");
        state.streaming.text.push_str("late words");

        ProcessorContext::new(&mut state, &collaborators, &config).flush_pending_assistant();
        let messages = drain_messages(&mut state);
        assert_eq!(
            messages[0].content,
            vec![
                ContentBlock::thinking("considering"),
                ContentBlock::tool_use("toolu_1", "Read", serde_json::json!({})),
                ContentBlock::text("late words"),
            ]
        );
    }

    #[test]
    fn flush_does_not_backfill_other_messages() {
        let mut state = AccumulatorState::new();
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        state.pending = Some(PendingAssistantMessage::new("msg_1"));
        state.begin_streaming(Some("msg_2".into()), None);
        state.streaming.text.push_str("belongs elsewhere");

        ProcessorContext::new(&mut state, &collaborators, &config).flush_pending_assistant();
        assert!(drain_messages(&mut state)[0].content.is_empty());
    }

    #[test]
    fn open_message_flushes_a_different_pending_message() {
        let mut state = AccumulatorState::new();
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        state.pending = Some(PendingAssistantMessage::new("msg_1"));
        state.begin_streaming(Some("msg_1".into()), None);

        ProcessorContext::new(&mut state, &collaborators, &config).open_message("msg_2", None);
        assert_eq!(state.streaming.message_id.as_deref(), Some("msg_2"));
        assert!(state.pending.is_none());
        assert_eq!(drain_messages(&mut state)[0].message_id, "msg_1");
    }
}
