//! Plan-mode entry and exit reviews.

use std::sync::Arc;

use serde_json::{json, Value};

use super::approval::{MISSING_TOOL_USE_ID, REQUEST_CANCELLED, UI_UNAVAILABLE};
use super::broker::ToolUseContext;
use super::decision::Decision;
use super::registry::{PendingRequest, RequestRegistry, Settlement};
use super::session::SessionFlags;
use super::ui::{UiChannel, UiRequest};
use crate::types::{ApprovalMode, PermissionMode, PermissionResult};
use crate::util::{input_str, with_fields};

const ENTER_DECLINED: &str = "The user declined to enter plan mode";
const PLAN_REJECTED: &str = "The user rejected the plan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStage {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanMeta {
    pub stage: PlanStage,
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug)]
pub struct PlanManager {
    registry: RequestRegistry<Decision, PlanMeta>,
    ui: Arc<UiChannel>,
    flags: Arc<SessionFlags>,
}

impl PlanManager {
    pub fn new(ui: Arc<UiChannel>, flags: Arc<SessionFlags>) -> Self {
        Self {
            registry: RequestRegistry::new(),
            ui,
            flags,
        }
    }

    pub async fn request_enter(&self, input: &Value, ctx: &ToolUseContext) -> PermissionResult {
        if self.flags.in_plan_mode() || self.flags.skip_permissions() {
            self.flags.set_mode(PermissionMode::Plan);
            return PermissionResult::allow(input.clone());
        }
        let request = match self.open(PlanStage::Enter, ctx) {
            Ok(request) => request,
            Err(denied) => return denied,
        };
        self.ui.post(UiRequest::PlanEnter {
            tool_use_id: request.id().to_string(),
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });

        match self.wait(request, ctx).await {
            Ok(decision) if decision.approved => {
                self.flags.set_mode(PermissionMode::Plan);
                PermissionResult::allow(input.clone())
            }
            Ok(decision) => PermissionResult::rejected(decision.feedback, ENTER_DECLINED),
            Err(cancelled) => cancelled,
        }
    }

    /// Every plan submission is reviewed; nothing short-circuits here.
    pub async fn request_exit(&self, input: &Value, ctx: &ToolUseContext) -> PermissionResult {
        let request = match self.open(PlanStage::Exit, ctx) {
            Ok(request) => request,
            Err(denied) => return denied,
        };
        self.ui.post(UiRequest::PlanExit {
            tool_use_id: request.id().to_string(),
            plan: input_str(input, "plan").map(str::to_string),
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });

        match self.wait(request, ctx).await {
            Ok(decision) if decision.approved => {
                let mode = match decision.approval_mode {
                    ApprovalMode::AcceptEdits => PermissionMode::AcceptEdits,
                    ApprovalMode::Manual => PermissionMode::Default,
                };
                self.flags.set_mode(mode);
                PermissionResult::allow(with_fields(
                    input,
                    [
                        ("approved", json!(true)),
                        ("approvalMode", json!(decision.approval_mode)),
                    ],
                ))
            }
            Ok(decision) => match decision.feedback.filter(|text| !text.trim().is_empty()) {
                Some(feedback) => PermissionResult::deny(format!(
                    "The user rejected the plan with feedback: {feedback}"
                )),
                None => PermissionResult::interrupt(PLAN_REJECTED),
            },
            Err(cancelled) => cancelled,
        }
    }

    fn open(
        &self,
        stage: PlanStage,
        ctx: &ToolUseContext,
    ) -> Result<PendingRequest<Decision>, PermissionResult> {
        let Some(tool_use_id) = ctx.tool_use_id.as_deref() else {
            return Err(PermissionResult::deny(MISSING_TOOL_USE_ID));
        };
        if !self.ui.is_available() {
            return Err(PermissionResult::deny(UI_UNAVAILABLE));
        }
        Ok(self.registry.open(
            tool_use_id,
            PlanMeta {
                stage,
                parent_tool_use_id: ctx.parent_tool_use_id.clone(),
            },
        ))
    }

    async fn wait(
        &self,
        request: PendingRequest<Decision>,
        ctx: &ToolUseContext,
    ) -> Result<Decision, PermissionResult> {
        let tool_use_id = request.id().to_string();
        match self.registry.settle(request, &ctx.cancel).await {
            Settlement::Resolved(decision) => Ok(decision),
            Settlement::Cancelled(meta) => {
                if meta.is_some() {
                    self.ui.post(UiRequest::RequestCancelled { tool_use_id });
                }
                Err(PermissionResult::interrupt(REQUEST_CANCELLED))
            }
            Settlement::Dropped => Err(PermissionResult::interrupt(REQUEST_CANCELLED)),
        }
    }

    pub fn resolve(&self, tool_use_id: &str, decision: Decision) -> bool {
        self.registry.resolve(tool_use_id, decision).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn teardown(&self) {
        for request in self.registry.drain() {
            let tool_use_id = request.id.clone();
            request.resolve(Decision::reject(None));
            self.ui.post(UiRequest::RequestCancelled { tool_use_id });
        }
    }
}
