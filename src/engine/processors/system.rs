use super::ProcessorContext;
use crate::engine::events::EngineEvent;
use crate::types::SystemEvent;

/// Surface session metadata unchanged.
pub fn process_system(event: SystemEvent, ctx: &mut ProcessorContext<'_>) {
    if !event.is_init() {
        ctx.state.emit(EngineEvent::SystemNotice {
            subtype: event.subtype,
            data: event.extra,
        });
        return;
    }

    if event.session_id.is_some() {
        ctx.state.set_session_id(event.session_id.clone());
    }
    tracing::debug!(
        session_id = ?event.session_id,
        model = ?event.model,
        tools = event.tools.len(),
        "session initialized"
    );
    ctx.state.emit(EngineEvent::SessionInit {
        session_id: event.session_id,
        model: event.model,
        tools: event.tools,
        permission_mode: event.permission_mode,
        mcp_servers: event.mcp_servers,
    });
}
