use super::ProcessorContext;
use crate::engine::events::EngineEvent;
use crate::types::{ContentBlock, UserEvent};

/// Forward user messages and environment tool results.
pub fn process_user(event: UserEvent, ctx: &mut ProcessorContext<'_>) {
    if event.session_id.is_some() {
        ctx.state.set_session_id(event.session_id.clone());
    }

    let content = event.message.content.into_blocks();
    let mut has_tool_results = false;
    for block in &content {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } = block
        {
            has_tool_results = true;
            ctx.collaborators
                .tool_tracker
                .handle_tool_result(tool_use_id, content, *is_error);
        }
    }

    if !has_tool_results && event.parent_tool_use_id.is_none() && event.uuid.is_some() {
        ctx.state.set_last_user_message_id(event.uuid.clone());
    }

    ctx.state.emit(EngineEvent::UserMessage {
        uuid: event.uuid,
        parent_tool_use_id: event.parent_tool_use_id,
        content,
    });
}
