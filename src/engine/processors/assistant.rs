use std::sync::OnceLock;

use regex::Regex;

use super::ProcessorContext;
use crate::engine::collaborators::{Collaborators, QueuedToolInfo, StreamedToolInfo};
use crate::engine::events::{ContextUsage, EngineEvent};
use crate::engine::state::{PendingAssistantMessage, StreamingContent};
use crate::types::{AssistantEvent, ContentBlock};

fn local_command_echo() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^\s*<(local-command-stdout|local-command-stderr|command-name|command-message)>",
            )
            .ok()
        })
        .as_ref()
}

/// Echoed output of a local slash command, which the runtime replays as an
/// assistant message.
fn is_local_command_echo(content: &[ContentBlock]) -> bool {
    let Some(pattern) = local_command_echo() else {
        return false;
    };
    !content.is_empty()
        && content.iter().all(|block| match block {
            ContentBlock::Text { text } => pattern.is_match(text),
            _ => false,
        })
}

/// Fold a finalized assistant event into the pending message.
pub fn process_assistant(event: AssistantEvent, ctx: &mut ProcessorContext<'_>) {
    let AssistantEvent {
        message,
        session_id,
        parent_tool_use_id,
        ..
    } = event;

    if parent_tool_use_id.is_none() {
        if let Some(usage) = &message.usage {
            let context_window = ctx
                .state
                .context_window()
                .unwrap_or(ctx.config.default_context_window);
            let session = ctx.state.record_usage(&message.id, usage).clone();
            ctx.state.emit(EngineEvent::UsageUpdated {
                usage: ContextUsage::new(usage.context_tokens(), context_window, session),
            });
        }
    }

    if session_id.is_some() {
        ctx.state.set_session_id(session_id.clone());
    }

    if is_local_command_echo(&message.content) {
        tracing::debug!(message_id = %message.id, "skipping local command echo");
        return;
    }

    ctx.open_message(&message.id, parent_tool_use_id.clone());

    let mut events = Vec::new();
    let state = &mut *ctx.state;
    let streaming = &mut state.streaming;
    let pending = state.pending.get_or_insert_with(|| {
        let mut pending = PendingAssistantMessage::new(message.id.clone());
        pending.session_id = session_id.clone();
        pending.parent_tool_use_id = parent_tool_use_id.clone();
        pending
    });
    if message.model.is_some() {
        pending.model = message.model.clone();
    }
    if message.stop_reason.is_some() {
        pending.stop_reason = message.stop_reason.clone();
    }

    for block in message.content {
        match block {
            ContentBlock::ToolUse { .. } => {
                accept_tool_use(block, streaming, pending, ctx.collaborators, &mut events);
            }
            ContentBlock::Text { text } => {
                if let Some(duration_ms) = streaming.finish_thinking() {
                    events.push(EngineEvent::ThinkingComplete {
                        message_id: streaming.message_id.clone(),
                        duration_ms,
                    });
                }
                accept_text(text, streaming, pending);
            }
            other => pending.push_unique(other),
        }
    }

    for event in events {
        ctx.state.emit(event);
    }
}

fn accept_tool_use(
    block: ContentBlock,
    streaming: &mut StreamingContent,
    pending: &mut PendingAssistantMessage,
    collaborators: &Collaborators,
    events: &mut Vec<EngineEvent>,
) {
    let ContentBlock::ToolUse { id, name, input } = &block else {
        return;
    };
    let tracker = &collaborators.tool_tracker;
    if tracker.streamed_tool_info(id).is_some() || streaming.has_tool(id) || pending.has_tool(id) {
        tracing::trace!(tool_use_id = %id, "tool use already registered");
        return;
    }

    if let Some(duration_ms) = streaming.finish_thinking() {
        events.push(EngineEvent::ThinkingComplete {
            message_id: streaming.message_id.clone(),
            duration_ms,
        });
    }

    tracker.register_streamed_tool(
        id,
        StreamedToolInfo {
            name: name.clone(),
            input: input.clone(),
            message_id: Some(pending.id.clone()),
            parent_tool_use_id: pending.parent_tool_use_id.clone(),
        },
    );
    tracker.queue_tool_info(
        name,
        QueuedToolInfo {
            tool_use_id: id.clone(),
            parent_tool_use_id: pending.parent_tool_use_id.clone(),
        },
    );

    if let Some(chunk) = streaming.commit_text() {
        pending.content.push(ContentBlock::text(chunk));
    }
    streaming.content_blocks.push(block.clone());
    streaming.has_streamed_tools = true;
    pending.content.push(block);

    events.push(EngineEvent::ToolStreaming {
        message_id: Some(pending.id.clone()),
        blocks: streaming.content_blocks.clone(),
    });
}

fn accept_text(
    text: String,
    streaming: &mut StreamingContent,
    pending: &mut PendingAssistantMessage,
) {
    let live = !streaming.uncommitted_text().trim().is_empty();
    if !live && !pending.last_is_tool() {
        pending.merge_text(&text);
        match streaming.content_blocks.last_mut() {
            Some(ContentBlock::Text { text: existing }) => existing.push_str(&text),
            _ => streaming.content_blocks.push(ContentBlock::text(text)),
        }
        return;
    }

    // The event text supersedes whatever deltas were gathered for it.
    streaming.committed_text_length = streaming.text.len();
    streaming.content_blocks.push(ContentBlock::text(text.clone()));
    pending.content.push(ContentBlock::text(text));
}
