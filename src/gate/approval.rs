//! File-edit and shell-command approvals, including sub-agent bulk approval.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::broker::ToolUseContext;
use super::decision::Decision;
use super::diff::{DiffManager, FileChange, PreparedDiff};
use super::registry::{PendingRequest, RequestRegistry, Settlement};
use super::session::SessionFlags;
use super::ui::{UiChannel, UiRequest};
use crate::types::{PermissionMode, PermissionResult};
use crate::util::{input_str, lock};

pub const EDIT_TARGET_NOT_FOUND: &str =
    "Could not find text to replace. The file may have changed; read it again before editing.";
pub const MISSING_TOOL_USE_ID: &str = "Permission request is missing a tool use id";
pub const UI_UNAVAILABLE: &str = "No approval interface is available to review this request";
pub const REQUEST_CANCELLED: &str = "Request cancelled";
const EDIT_REJECTED: &str = "The user rejected this change";
const COMMAND_REJECTED: &str = "The user rejected this command";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalKind {
    File,
    Bash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalMeta {
    pub kind: ApprovalKind,
    /// Diff view opened for this request.
    pub diff_id: Option<String>,
    pub parent_tool_use_id: Option<String>,
}

pub struct ApprovalManager {
    registry: RequestRegistry<Decision, ApprovalMeta>,
    auto_approved_subagents: Mutex<HashSet<String>>,
    ui: Arc<UiChannel>,
    diff: Arc<dyn DiffManager>,
    flags: Arc<SessionFlags>,
}

impl ApprovalManager {
    pub fn new(
        ui: Arc<UiChannel>,
        diff: Arc<dyn DiffManager>,
        flags: Arc<SessionFlags>,
    ) -> Self {
        Self {
            registry: RequestRegistry::new(),
            auto_approved_subagents: Mutex::new(HashSet::new()),
            ui,
            diff,
            flags,
        }
    }

    fn subagent_auto_approved(&self, parent_tool_use_id: Option<&str>) -> bool {
        parent_tool_use_id
            .is_some_and(|parent| lock(&self.auto_approved_subagents).contains(parent))
    }

    /// Review an `Edit` or `Write` before it touches the file.
    pub async fn request_file_approval(
        &self,
        tool_name: &str,
        input: &Value,
        ctx: &ToolUseContext,
    ) -> PermissionResult {
        if self.flags.edits_auto_approved()
            || self.subagent_auto_approved(ctx.parent_tool_use_id.as_deref())
        {
            tracing::debug!(tool_name, "file change auto-approved");
            return PermissionResult::allow(input.clone());
        }
        let Some(tool_use_id) = ctx.tool_use_id.as_deref() else {
            return PermissionResult::deny(MISSING_TOOL_USE_ID);
        };
        if !self.ui.is_available() {
            tracing::warn!(tool_use_id, tool_name, "cannot review file change without UI");
            return PermissionResult::deny(UI_UNAVAILABLE);
        }

        let file_path = input_str(input, "file_path").unwrap_or_default();
        let change = file_change(tool_name, input);
        let diff = match self
            .diff
            .prepare_diff(tool_use_id, tool_name, file_path, &change)
            .await
        {
            Some(diff) => diff,
            None if change.is_edit() => return PermissionResult::deny(EDIT_TARGET_NOT_FOUND),
            None => PreparedDiff::from_change("", &change).unwrap_or_else(|| PreparedDiff {
                original_content: String::new(),
                proposed_content: String::new(),
                edit_line_number: None,
            }),
        };
        self.diff
            .show_diff_view(tool_use_id, file_path, &diff)
            .await;

        let request = self.registry.open(
            tool_use_id,
            ApprovalMeta {
                kind: ApprovalKind::File,
                diff_id: Some(tool_use_id.to_string()),
                parent_tool_use_id: ctx.parent_tool_use_id.clone(),
            },
        );
        // The parent may have been approved while the diff was being prepared.
        if self.subagent_auto_approved(ctx.parent_tool_use_id.as_deref()) {
            if let Some(meta) = self.registry.cancel(tool_use_id) {
                self.close_diff(&meta);
            }
            tracing::debug!(tool_use_id, "file change auto-approved after diff preparation");
            return PermissionResult::allow(input.clone());
        }
        self.ui.post(UiRequest::FileApproval {
            tool_use_id: tool_use_id.to_string(),
            tool_name: tool_name.to_string(),
            file_path: file_path.to_string(),
            original_content: diff.original_content,
            proposed_content: diff.proposed_content,
            edit_line_number: diff.edit_line_number,
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });
        self.await_decision(request, ctx, input, EDIT_REJECTED).await
    }

    /// Review a shell command.
    pub async fn request_bash_approval(
        &self,
        input: &Value,
        ctx: &ToolUseContext,
    ) -> PermissionResult {
        if self.flags.skip_permissions()
            || self.flags.mode() == PermissionMode::BypassPermissions
            || self.subagent_auto_approved(ctx.parent_tool_use_id.as_deref())
        {
            return PermissionResult::allow(input.clone());
        }
        let Some(tool_use_id) = ctx.tool_use_id.as_deref() else {
            return PermissionResult::deny(MISSING_TOOL_USE_ID);
        };
        if !self.ui.is_available() {
            tracing::warn!(tool_use_id, "cannot review command without UI");
            return PermissionResult::deny(UI_UNAVAILABLE);
        }

        let command = input_str(input, "command")
            .map(str::to_string)
            .unwrap_or_else(|| input.to_string());
        let request = self.registry.open(
            tool_use_id,
            ApprovalMeta {
                kind: ApprovalKind::Bash,
                diff_id: None,
                parent_tool_use_id: ctx.parent_tool_use_id.clone(),
            },
        );
        self.ui.post(UiRequest::BashApproval {
            tool_use_id: tool_use_id.to_string(),
            command,
            description: input_str(input, "description").map(str::to_string),
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });
        self.await_decision(request, ctx, input, COMMAND_REJECTED).await
    }

    async fn await_decision(
        &self,
        request: PendingRequest<Decision>,
        ctx: &ToolUseContext,
        input: &Value,
        rejection: &str,
    ) -> PermissionResult {
        let tool_use_id = request.id().to_string();
        match self.registry.settle(request, &ctx.cancel).await {
            Settlement::Resolved(decision) if decision.approved => {
                PermissionResult::allow(input.clone())
            }
            Settlement::Resolved(decision) => {
                PermissionResult::rejected(decision.feedback, rejection)
            }
            Settlement::Cancelled(meta) => {
                if let Some(meta) = meta {
                    self.close_diff(&meta);
                    self.ui.post(UiRequest::RequestCancelled { tool_use_id });
                }
                PermissionResult::interrupt(REQUEST_CANCELLED)
            }
            Settlement::Dropped => PermissionResult::interrupt(REQUEST_CANCELLED),
        }
    }

    fn close_diff(&self, meta: &ApprovalMeta) {
        if let Some(diff_id) = &meta.diff_id {
            self.diff.close_diff_view(diff_id);
        }
    }

    /// Apply the UI's decision. Unknown ids are a no-op.
    pub fn resolve(&self, tool_use_id: &str, decision: Decision) -> bool {
        match self.registry.resolve(tool_use_id, decision) {
            Some(meta) => {
                self.close_diff(&meta);
                true
            }
            None => false,
        }
    }

    /// Approve everything `parent_tool_use_id` asks for from now on, and
    /// every request of it that is already waiting. Returns how many were
    /// waiting.
    pub fn auto_approve_subagent(&self, parent_tool_use_id: &str) -> usize {
        lock(&self.auto_approved_subagents).insert(parent_tool_use_id.to_string());
        let waiting = self
            .registry
            .take_where(|meta| meta.parent_tool_use_id.as_deref() == Some(parent_tool_use_id));
        let count = waiting.len();
        for request in waiting {
            self.close_diff(&request.meta);
            let tool_use_id = request.id.clone();
            request.resolve(Decision::approve());
            self.ui.post(UiRequest::ApprovalAutoResolved {
                tool_use_id,
                parent_tool_use_id: parent_tool_use_id.to_string(),
            });
        }
        tracing::debug!(parent_tool_use_id, resolved = count, "sub-agent auto-approved");
        count
    }

    pub fn revoke_subagent(&self, parent_tool_use_id: &str) -> bool {
        lock(&self.auto_approved_subagents).remove(parent_tool_use_id)
    }

    pub fn is_subagent_auto_approved(&self, parent_tool_use_id: &str) -> bool {
        lock(&self.auto_approved_subagents).contains(parent_tool_use_id)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_pending(&self, tool_use_id: &str) -> bool {
        self.registry.contains(tool_use_id)
    }

    /// Reject every waiting request and forget sub-agent approvals.
    pub fn teardown(&self) {
        for request in self.registry.drain() {
            self.close_diff(&request.meta);
            let tool_use_id = request.id.clone();
            request.resolve(Decision::reject(None));
            self.ui.post(UiRequest::RequestCancelled { tool_use_id });
        }
        lock(&self.auto_approved_subagents).clear();
    }
}

fn file_change(tool_name: &str, input: &Value) -> FileChange {
    let field = |key: &str| input_str(input, key).unwrap_or_default().to_string();
    if tool_name == "Write" {
        FileChange::Write {
            content: field("content"),
        }
    } else {
        FileChange::Edit {
            old_string: field("old_string"),
            new_string: field("new_string"),
            replace_all: input
                .get("replace_all")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

impl std::fmt::Debug for ApprovalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalManager")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::diff::LocalDiffManager;
    use crate::gate::ui::UiSink;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn manager(sink: Option<UiSink>) -> (ApprovalManager, Arc<SessionFlags>) {
        let flags = Arc::new(SessionFlags::default());
        let manager = ApprovalManager::new(
            Arc::new(UiChannel::new(sink)),
            Arc::new(LocalDiffManager),
            Arc::clone(&flags),
        );
        (manager, flags)
    }

    fn ctx(tool_use_id: &str) -> ToolUseContext {
        ToolUseContext::new(CancellationToken::new()).with_tool_use_id(tool_use_id)
    }

    fn silent_sink() -> UiSink {
        Arc::new(|_request| {})
    }

    #[tokio::test]
    async fn missing_ui_denies_immediately() {
        let (manager, _) = manager(None);
        let result = manager
            .request_bash_approval(&json!({ "command": "ls" }), &ctx("toolu_1"))
            .await;
        assert_eq!(result, PermissionResult::deny(UI_UNAVAILABLE));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn accept_edits_mode_skips_review() {
        let (manager, flags) = manager(None);
        flags.set_mode(PermissionMode::AcceptEdits);
        let input = json!({ "file_path": "/tmp/x", "content": "y" });
        let result = manager
            .request_file_approval("Write", &input, &ctx("toolu_1"))
            .await;
        assert_eq!(result, PermissionResult::allow(input));
    }

    #[tokio::test]
    async fn unresolvable_edit_is_denied_without_round_trip() {
        let posted = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&posted);
        let sink: UiSink = Arc::new(move |_request| *counter.lock().unwrap() += 1);
        let (manager, _) = manager(Some(sink));
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, "hello").unwrap();

        let input = json!({
            "file_path": path.to_str().unwrap(),
            "old_string": "goodbye",
            "new_string": "farewell"
        });
        let result = manager
            .request_file_approval("Edit", &input, &ctx("toolu_1"))
            .await;
        assert_eq!(result, PermissionResult::deny(EDIT_TARGET_NOT_FOUND));
        assert_eq!(*posted.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn rejection_without_feedback_interrupts() {
        let (manager, _) = manager(Some(silent_sink()));
        let manager = Arc::new(manager);
        let waiting = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .request_bash_approval(&json!({ "command": "rm -rf target" }), &ctx("toolu_1"))
                    .await
            })
        };
        while !manager.is_pending("toolu_1") {
            tokio::task::yield_now().await;
        }
        assert!(manager.resolve("toolu_1", Decision::reject(None)));
        let result = waiting.await.unwrap();
        assert!(result.is_interrupt());
    }

    #[tokio::test]
    async fn bash_falls_back_to_json_command() {
        let posted = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&posted);
        let sink: UiSink = Arc::new(move |request| captured.lock().unwrap().push(request));
        let (manager, _) = manager(Some(sink));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = ToolUseContext::new(cancel).with_tool_use_id("toolu_1");

        manager.request_bash_approval(&json!({ "cmd": "ls" }), &ctx).await;
        let posted = posted.lock().unwrap();
        let UiRequest::BashApproval { command, .. } = &posted[0] else {
            panic!("expected bash approval");
        };
        assert_eq!(command, r#"{"cmd":"ls"}"#);
        assert_eq!(
            posted[1],
            UiRequest::RequestCancelled {
                tool_use_id: "toolu_1".into()
            }
        );
    }
}
