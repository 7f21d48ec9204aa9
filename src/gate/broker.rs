//! Single entry point the runtime awaits before executing any tool.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use super::approval::ApprovalManager;
use super::confirm::{confirm, ConfirmHandler, ConfirmRequest};
use super::decision::Decision;
use super::diff::{DiffManager, LocalDiffManager};
use super::plan::PlanManager;
use super::question::{Answers, QuestionManager};
use super::session::SessionFlags;
use super::skill::SkillManager;
use super::ui::{UiChannel, UiSink};
use crate::config::BridgeConfig;
use crate::types::{PermissionMode, PermissionResult};
use crate::util::{read, write};

/// Per-call context supplied by the runtime.
#[derive(Debug, Clone, Default)]
pub struct ToolUseContext {
    pub cancel: CancellationToken,
    pub tool_use_id: Option<String>,
    /// Set when the call comes from a sub-agent.
    pub parent_tool_use_id: Option<String>,
}

impl ToolUseContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tool_use_id: None,
            parent_tool_use_id: None,
        }
    }

    pub fn with_tool_use_id(mut self, tool_use_id: impl Into<String>) -> Self {
        self.tool_use_id = Some(tool_use_id.into());
        self
    }

    pub fn with_parent(mut self, parent_tool_use_id: impl Into<String>) -> Self {
        self.parent_tool_use_id = Some(parent_tool_use_id.into());
        self
    }
}

/// Policy chosen for a tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ToolRoute {
    PlanEnter,
    PlanExit,
    FileEdit,
    Bash,
    Question,
    ReadOnly,
    Mcp,
    Skill,
    SkipPermissions,
    Confirm,
}

struct GateInner {
    config: BridgeConfig,
    flags: Arc<SessionFlags>,
    ui: Arc<UiChannel>,
    approvals: ApprovalManager,
    questions: QuestionManager,
    plans: PlanManager,
    skills: SkillManager,
    confirm_handler: RwLock<Option<ConfirmHandler>>,
}

/// Routes tool-use permission checks to their policy.
///
/// Cloning is cheap; clones share pending requests and session flags.
#[derive(Clone)]
pub struct ToolGate {
    inner: Arc<GateInner>,
}

impl ToolGate {
    pub fn new(config: BridgeConfig, diff: Arc<dyn DiffManager>) -> Self {
        let flags = Arc::new(SessionFlags::new(
            config.permission_mode,
            config.skip_permissions,
        ));
        let ui = Arc::new(UiChannel::default());
        Self {
            inner: Arc::new(GateInner {
                approvals: ApprovalManager::new(Arc::clone(&ui), diff, Arc::clone(&flags)),
                questions: QuestionManager::new(Arc::clone(&ui)),
                plans: PlanManager::new(Arc::clone(&ui), Arc::clone(&flags)),
                skills: SkillManager::new(Arc::clone(&ui), Arc::clone(&flags)),
                config,
                flags,
                ui,
                confirm_handler: RwLock::new(None),
            }),
        }
    }

    /// Gate backed by [`LocalDiffManager`].
    pub fn with_local_diffs(config: BridgeConfig) -> Self {
        Self::new(config, Arc::new(LocalDiffManager))
    }

    pub fn with_ui_sink(self, sink: UiSink) -> Self {
        self.set_ui_sink(Some(sink));
        self
    }

    pub fn with_confirm_handler(self, handler: ConfirmHandler) -> Self {
        self.set_confirm_handler(Some(handler));
        self
    }

    pub fn set_ui_sink(&self, sink: Option<UiSink>) {
        self.inner.ui.set(sink);
    }

    pub fn set_confirm_handler(&self, handler: Option<ConfirmHandler>) {
        *write(&self.inner.confirm_handler) = handler;
    }

    pub fn route(&self, tool_name: &str) -> ToolRoute {
        let config = &self.inner.config;
        match tool_name {
            "EnterPlanMode" => ToolRoute::PlanEnter,
            "ExitPlanMode" if self.inner.flags.in_plan_mode() => ToolRoute::PlanExit,
            "Edit" | "Write" => ToolRoute::FileEdit,
            "Bash" => ToolRoute::Bash,
            "AskUserQuestion" => ToolRoute::Question,
            name if config.is_read_only_tool(name) => ToolRoute::ReadOnly,
            name if config.is_mcp_tool(name) => ToolRoute::Mcp,
            "Skill" => ToolRoute::Skill,
            _ if self.inner.flags.skip_permissions() => ToolRoute::SkipPermissions,
            _ => ToolRoute::Confirm,
        }
    }

    /// Decide whether `tool_name` may run with `input`.
    pub async fn can_use_tool(
        &self,
        tool_name: &str,
        input: &Value,
        ctx: &ToolUseContext,
    ) -> PermissionResult {
        let route = self.route(tool_name);
        tracing::debug!(
            tool_name,
            %route,
            tool_use_id = ?ctx.tool_use_id,
            parent_tool_use_id = ?ctx.parent_tool_use_id,
            "routing permission check"
        );
        let inner = &self.inner;
        match route {
            ToolRoute::PlanEnter => inner.plans.request_enter(input, ctx).await,
            ToolRoute::PlanExit => inner.plans.request_exit(input, ctx).await,
            ToolRoute::FileEdit => {
                inner
                    .approvals
                    .request_file_approval(tool_name, input, ctx)
                    .await
            }
            ToolRoute::Bash => inner.approvals.request_bash_approval(input, ctx).await,
            ToolRoute::Question => inner.questions.ask(input, ctx).await,
            ToolRoute::ReadOnly | ToolRoute::Mcp | ToolRoute::SkipPermissions => {
                PermissionResult::allow(input.clone())
            }
            ToolRoute::Skill => inner.skills.request(input, ctx).await,
            ToolRoute::Confirm => {
                let handler = read(&inner.confirm_handler).clone();
                let request = ConfirmRequest::new(
                    ctx.tool_use_id.as_deref(),
                    tool_name,
                    input,
                    ctx.parent_tool_use_id.clone(),
                );
                confirm(handler, request, &ctx.cancel).await
            }
        }
    }

    /// Resolve a file-edit or shell-command approval.
    pub fn resolve_approval(&self, tool_use_id: &str, decision: Decision) -> bool {
        self.inner.approvals.resolve(tool_use_id, decision)
    }

    /// `None` means the user dismissed the question.
    pub fn resolve_question(&self, tool_use_id: &str, answers: Option<Answers>) -> bool {
        self.inner.questions.resolve(tool_use_id, answers)
    }

    pub fn resolve_plan(&self, tool_use_id: &str, decision: Decision) -> bool {
        self.inner.plans.resolve(tool_use_id, decision)
    }

    pub fn resolve_skill(&self, tool_use_id: &str, decision: Decision) -> bool {
        self.inner.skills.resolve(tool_use_id, decision)
    }

    /// Approve a sub-agent's pending and future file and shell requests.
    pub fn auto_approve_subagent(&self, parent_tool_use_id: &str) -> usize {
        self.inner.approvals.auto_approve_subagent(parent_tool_use_id)
    }

    pub fn revoke_subagent(&self, parent_tool_use_id: &str) -> bool {
        self.inner.approvals.revoke_subagent(parent_tool_use_id)
    }

    pub fn approve_skill(&self, skill: &str) {
        self.inner.skills.approve_skill(skill);
    }

    pub fn revoke_skill(&self, skill: &str) -> bool {
        self.inner.skills.revoke_skill(skill)
    }

    pub fn permission_mode(&self) -> PermissionMode {
        self.inner.flags.mode()
    }

    pub fn set_permission_mode(&self, mode: PermissionMode) {
        self.inner.flags.set_mode(mode);
    }

    pub fn skip_permissions(&self) -> bool {
        self.inner.flags.skip_permissions()
    }

    pub fn set_skip_permissions(&self, skip: bool) {
        self.inner.flags.set_skip_permissions(skip);
    }

    /// Requests currently waiting on the UI.
    pub fn pending_count(&self) -> usize {
        let inner = &self.inner;
        inner.approvals.pending_count()
            + inner.questions.pending_count()
            + inner.plans.pending_count()
            + inner.skills.pending_count()
    }

    pub fn is_approval_pending(&self, tool_use_id: &str) -> bool {
        self.inner.approvals.is_pending(tool_use_id)
    }

    /// End the session: reject everything pending and forget auto-approvals.
    pub fn teardown(&self) {
        let inner = &self.inner;
        inner.approvals.teardown();
        inner.questions.teardown();
        inner.plans.teardown();
        inner.skills.teardown();
        tracing::debug!("tool gate torn down");
    }
}

impl std::fmt::Debug for ToolGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolGate")
            .field("mode", &self.permission_mode())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}
