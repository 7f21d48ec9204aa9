//! Shared test helpers: recording collaborators and runtime event builders.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use turngate::engine::{
    CheckpointTracker, Collaborators, EngineEvent, EngineEventSink, QueuedToolInfo,
    StreamedToolInfo, ToolTracker,
};
use turngate::gate::{DiffManager, FileChange, PreparedDiff, UiRequest, UiSink};
use turngate::types::RuntimeEvent;

/// Records every engine event in order.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    pub fn sink(&self) -> EngineEventSink {
        let events = Arc::clone(&self.events);
        Arc::new(move |event| events.lock().unwrap().push(event))
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn assistant_messages(&self) -> Vec<turngate::engine::AssistantMessage> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                EngineEvent::AssistantMessage { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

/// Records every request posted to the UI.
#[derive(Clone, Default)]
pub struct UiLog {
    requests: Arc<Mutex<Vec<UiRequest>>>,
}

impl UiLog {
    pub fn sink(&self) -> UiSink {
        let requests = Arc::clone(&self.requests);
        Arc::new(move |request| requests.lock().unwrap().push(request))
    }

    pub fn requests(&self) -> Vec<UiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Tool tracker and checkpoint tracker that remember their calls.
#[derive(Default)]
pub struct RecordingTracker {
    pub registered: Mutex<Vec<(String, StreamedToolInfo)>>,
    pub queued: Mutex<Vec<(String, QueuedToolInfo)>>,
    pub abandoned: Mutex<Vec<String>>,
    pub abandoned_all: Mutex<usize>,
    pub turn_resets: Mutex<usize>,
    pub checkpoints: Mutex<Vec<(String, String)>>,
    pub costs: Mutex<Vec<f64>>,
}

impl RecordingTracker {
    pub fn collaborators(self: &Arc<Self>) -> Collaborators {
        Collaborators::new(Arc::clone(self) as _, Arc::clone(self) as _)
    }

    pub fn registered_ids(&self) -> Vec<String> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl ToolTracker for RecordingTracker {
    fn register_streamed_tool(&self, tool_use_id: &str, info: StreamedToolInfo) {
        self.registered
            .lock()
            .unwrap()
            .push((tool_use_id.to_string(), info));
    }

    fn queue_tool_info(&self, tool_name: &str, info: QueuedToolInfo) {
        self.queued.lock().unwrap().push((tool_name.to_string(), info));
    }

    fn streamed_tool_info(&self, tool_use_id: &str) -> Option<StreamedToolInfo> {
        self.registered
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == tool_use_id)
            .map(|(_, info)| info.clone())
    }

    fn send_abandoned_tools(&self, message_id: &str) {
        self.abandoned.lock().unwrap().push(message_id.to_string());
    }

    fn send_all_abandoned_tools(&self) {
        *self.abandoned_all.lock().unwrap() += 1;
    }

    fn reset_turn(&self) {
        *self.turn_resets.lock().unwrap() += 1;
    }
}

impl CheckpointTracker for RecordingTracker {
    fn track_checkpoint(&self, assistant_message_id: &str, user_message_id: &str) {
        self.checkpoints
            .lock()
            .unwrap()
            .push((assistant_message_id.to_string(), user_message_id.to_string()));
    }

    fn update_cost(&self, total_cost_usd: f64) {
        self.costs.lock().unwrap().push(total_cost_usd);
    }
}

/// Diff manager that prepares diffs in memory and records closed views.
#[derive(Default)]
pub struct RecordingDiffManager {
    pub shown: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
}

impl RecordingDiffManager {
    pub fn closed(&self) -> Vec<String> {
        let mut closed = self.closed.lock().unwrap().clone();
        closed.sort();
        closed
    }
}

#[async_trait]
impl DiffManager for RecordingDiffManager {
    async fn prepare_diff(
        &self,
        _tool_use_id: &str,
        _tool_name: &str,
        _file_path: &str,
        change: &FileChange,
    ) -> Option<PreparedDiff> {
        PreparedDiff::from_change("fn main() {}\n", change)
    }

    async fn show_diff_view(&self, tool_use_id: &str, _file_path: &str, _diff: &PreparedDiff) {
        self.shown.lock().unwrap().push(tool_use_id.to_string());
    }

    fn close_diff_view(&self, tool_use_id: &str) {
        self.closed.lock().unwrap().push(tool_use_id.to_string());
    }
}

/// Diff manager whose `prepare_diff` parks until [`HeldDiffManager::release`].
#[derive(Default)]
pub struct HeldDiffManager {
    pub inner: RecordingDiffManager,
    entered: Notify,
    released: Notify,
}

impl HeldDiffManager {
    /// Wait until a diff is being prepared.
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }
}

#[async_trait]
impl DiffManager for HeldDiffManager {
    async fn prepare_diff(
        &self,
        tool_use_id: &str,
        tool_name: &str,
        file_path: &str,
        change: &FileChange,
    ) -> Option<PreparedDiff> {
        self.entered.notify_one();
        self.released.notified().await;
        self.inner
            .prepare_diff(tool_use_id, tool_name, file_path, change)
            .await
    }

    async fn show_diff_view(&self, tool_use_id: &str, file_path: &str, diff: &PreparedDiff) {
        self.inner.show_diff_view(tool_use_id, file_path, diff).await;
    }

    fn close_diff_view(&self, tool_use_id: &str) {
        self.inner.close_diff_view(tool_use_id);
    }
}

fn event(raw: Value) -> RuntimeEvent {
    serde_json::from_value(raw).expect("valid runtime event")
}

pub fn system_init(session_id: &str) -> RuntimeEvent {
    event(json!({
        "type": "system",
        "subtype": "init",
        "session_id": session_id,
        "model": "claude-sonnet",
        "tools": ["Bash", "Read", "Edit"],
        "permissionMode": "default",
        "mcp_servers": [{ "name": "linear", "status": "connected" }],
        "cwd": "/workspace"
    }))
}

pub fn message_start(id: &str) -> RuntimeEvent {
    event(json!({
        "type": "stream_event",
        "event": { "type": "message_start", "message": { "id": id, "model": "claude-sonnet" } }
    }))
}

pub fn text_delta(text: &str) -> RuntimeEvent {
    event(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": text }
        }
    }))
}

pub fn thinking_delta(thinking: &str) -> RuntimeEvent {
    event(json!({
        "type": "stream_event",
        "event": {
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "thinking_delta", "thinking": thinking }
        }
    }))
}

pub fn assistant(id: &str, content: Value) -> RuntimeEvent {
    event(json!({
        "type": "assistant",
        "session_id": "session-1",
        "message": { "id": id, "model": "claude-sonnet", "content": content }
    }))
}

pub fn assistant_text(id: &str, text: &str) -> RuntimeEvent {
    assistant(id, json!([{ "type": "text", "text": text }]))
}

pub fn assistant_tool(id: &str, tool_use_id: &str, name: &str, input: Value) -> RuntimeEvent {
    assistant(
        id,
        json!([{ "type": "tool_use", "id": tool_use_id, "name": name, "input": input }]),
    )
}

pub fn tool_result(tool_use_id: &str, content: &str, is_error: bool) -> RuntimeEvent {
    event(json!({
        "type": "user",
        "session_id": "session-1",
        "message": {
            "content": [{
                "type": "tool_result",
                "tool_use_id": tool_use_id,
                "content": content,
                "is_error": is_error
            }]
        }
    }))
}

pub fn result(subtype: &str, total_cost_usd: f64) -> RuntimeEvent {
    event(json!({
        "type": "result",
        "subtype": subtype,
        "is_error": subtype != "success",
        "total_cost_usd": total_cost_usd,
        "num_turns": 1,
        "duration_ms": 1200,
        "session_id": "session-1"
    }))
}
