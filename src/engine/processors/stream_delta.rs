use super::ProcessorContext;
use crate::engine::events::{DeltaKind, EngineEvent};
use crate::types::{BlockDelta, ContentBlock, PartialEvent, RawStreamEvent};

/// Accumulate one incremental fragment. Blocks are never finalized here.
pub fn process_stream_event(event: PartialEvent, ctx: &mut ProcessorContext<'_>) {
    if event.session_id.is_some() {
        ctx.state.set_session_id(event.session_id.clone());
    }

    match event.event {
        RawStreamEvent::MessageStart { message } => {
            ctx.open_message(&message.id, event.parent_tool_use_id);
        }
        RawStreamEvent::ContentBlockStart { content_block, .. } => match content_block {
            ContentBlock::Thinking { .. } => start_thinking(ctx),
            ContentBlock::Text { .. } | ContentBlock::ToolUse { .. } => ctx.finish_thinking(),
            _ => {}
        },
        RawStreamEvent::ContentBlockDelta { delta, .. } => match delta {
            BlockDelta::TextDelta { text } => {
                ctx.finish_thinking();
                tracing::trace!(len = text.len(), "text delta");
                ctx.state.streaming.text.push_str(&text);
                let message_id = ctx.state.streaming.message_id.clone();
                ctx.state.emit(EngineEvent::StreamDelta {
                    message_id,
                    kind: DeltaKind::Text,
                    text,
                });
            }
            BlockDelta::ThinkingDelta { thinking } => {
                start_thinking(ctx);
                tracing::trace!(len = thinking.len(), "thinking delta");
                ctx.state.streaming.thinking.push_str(&thinking);
                let message_id = ctx.state.streaming.message_id.clone();
                ctx.state.emit(EngineEvent::StreamDelta {
                    message_id,
                    kind: DeltaKind::Thinking,
                    text: thinking,
                });
            }
            BlockDelta::InputJsonDelta { .. }
            | BlockDelta::SignatureDelta { .. }
            | BlockDelta::Unknown => {}
        },
        RawStreamEvent::ContentBlockStop { .. }
        | RawStreamEvent::MessageDelta { .. }
        | RawStreamEvent::MessageStop
        | RawStreamEvent::Unknown => {}
    }
}

fn start_thinking(ctx: &mut ProcessorContext<'_>) {
    if ctx.state.streaming.start_thinking() {
        let message_id = ctx.state.streaming.message_id.clone();
        ctx.state.emit(EngineEvent::ThinkingStarted { message_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BridgeConfig;
    use crate::engine::collaborators::Collaborators;
    use crate::engine::state::{AccumulatorState, PendingAssistantMessage};
    use crate::types::MessageStart;

    fn partial(event: RawStreamEvent) -> PartialEvent {
        PartialEvent {
            event,
            session_id: None,
            parent_tool_use_id: None,
        }
    }

    fn feed(state: &mut AccumulatorState, events: Vec<RawStreamEvent>) {
        let collaborators = Collaborators::default();
        let config = BridgeConfig::default();
        for event in events {
            process_stream_event(
                partial(event),
                &mut ProcessorContext::new(state, &collaborators, &config),
            );
        }
    }

    fn text_delta(text: &str) -> RawStreamEvent {
        RawStreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::TextDelta { text: text.into() },
        }
    }

    #[test]
    fn deltas_accumulate_without_finalizing() {
        let mut state = AccumulatorState::new();
        feed(
            &mut state,
            vec![
                RawStreamEvent::MessageStart {
                    message: MessageStart {
                        id: "msg_1".into(),
                        model: None,
                    },
                },
                text_delta("Hel"),
                text_delta("lo"),
            ],
        );
        assert_eq!(state.streaming.message_id.as_deref(), Some("msg_1"));
        assert_eq!(state.streaming.text, "Hello");
        assert!(state.streaming.content_blocks.is_empty());
        assert!(state.pending.is_none());
    }

    #[test]
    fn thinking_transitions_are_reported() {
        let mut state = AccumulatorState::new();
        feed(
            &mut state,
            vec![
                RawStreamEvent::ContentBlockStart {
                    index: 0,
                    content_block: ContentBlock::thinking(""),
                },
                RawStreamEvent::ContentBlockDelta {
                    index: 0,
                    delta: BlockDelta::ThinkingDelta {
                        thinking: "hmm".into(),
                    },
                },
                text_delta("Answer"),
            ],
        );
        let events = state.take_outbox().events;
        assert!(matches!(events[0], EngineEvent::ThinkingStarted { .. }));
        assert!(events
            .iter()
            .any(|event| matches!(event, EngineEvent::ThinkingComplete { .. })));
        assert!(!state.streaming.is_thinking);
        assert_eq!(state.streaming.thinking, "hmm");
    }

    #[test]
    fn message_start_for_new_message_flushes_pending() {
        let mut state = AccumulatorState::new();
        state.pending = Some(PendingAssistantMessage::new("msg_1"));
        state.begin_streaming(Some("msg_1".into()), None);
        feed(
            &mut state,
            vec![RawStreamEvent::MessageStart {
                message: MessageStart {
                    id: "msg_2".into(),
                    model: None,
                },
            }],
        );
        assert!(state.pending.is_none());
        assert_eq!(state.streaming.message_id.as_deref(), Some("msg_2"));
    }
}
