use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use super::approval::{MISSING_TOOL_USE_ID, REQUEST_CANCELLED, UI_UNAVAILABLE};
use super::broker::ToolUseContext;
use super::decision::Decision;
use super::registry::{RequestRegistry, Settlement};
use super::session::SessionFlags;
use super::ui::{UiChannel, UiRequest};
use crate::types::{ApprovalMode, PermissionResult};
use crate::util::{input_str, lock};

const SKILL_REJECTED: &str = "The user rejected this skill";

/// Reviews `Skill` invocations; remembers skills approved for the session.
#[derive(Debug)]
pub struct SkillManager {
    registry: RequestRegistry<Decision, Option<String>>,
    auto_approved: Mutex<HashSet<String>>,
    ui: Arc<UiChannel>,
    flags: Arc<SessionFlags>,
}

impl SkillManager {
    pub fn new(ui: Arc<UiChannel>, flags: Arc<SessionFlags>) -> Self {
        Self {
            registry: RequestRegistry::new(),
            auto_approved: Mutex::new(HashSet::new()),
            ui,
            flags,
        }
    }

    pub async fn request(&self, input: &Value, ctx: &ToolUseContext) -> PermissionResult {
        let skill = skill_name(input);
        if self.flags.skip_permissions() || lock(&self.auto_approved).contains(&skill) {
            tracing::debug!(%skill, "skill auto-approved");
            return PermissionResult::allow(input.clone());
        }
        let Some(tool_use_id) = ctx.tool_use_id.as_deref() else {
            return PermissionResult::deny(MISSING_TOOL_USE_ID);
        };
        if !self.ui.is_available() {
            return PermissionResult::deny(UI_UNAVAILABLE);
        }

        let request = self
            .registry
            .open(tool_use_id, ctx.parent_tool_use_id.clone());
        self.ui.post(UiRequest::SkillApproval {
            tool_use_id: tool_use_id.to_string(),
            skill: skill.clone(),
            args: input_str(input, "args").map(str::to_string),
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });

        match self.registry.settle(request, &ctx.cancel).await {
            Settlement::Resolved(decision) if decision.approved => {
                if decision.approval_mode == ApprovalMode::AcceptEdits {
                    self.approve_skill(&skill);
                }
                PermissionResult::allow(input.clone())
            }
            Settlement::Resolved(decision) => {
                PermissionResult::rejected(decision.feedback, SKILL_REJECTED)
            }
            Settlement::Cancelled(meta) => {
                if meta.is_some() {
                    self.ui.post(UiRequest::RequestCancelled {
                        tool_use_id: tool_use_id.to_string(),
                    });
                }
                PermissionResult::interrupt(REQUEST_CANCELLED)
            }
            Settlement::Dropped => PermissionResult::interrupt(REQUEST_CANCELLED),
        }
    }

    pub fn resolve(&self, tool_use_id: &str, decision: Decision) -> bool {
        self.registry.resolve(tool_use_id, decision).is_some()
    }

    /// Pre-approve `skill` for the rest of the session.
    pub fn approve_skill(&self, skill: &str) {
        lock(&self.auto_approved).insert(skill.to_string());
    }

    pub fn revoke_skill(&self, skill: &str) -> bool {
        lock(&self.auto_approved).remove(skill)
    }

    pub fn is_auto_approved(&self, skill: &str) -> bool {
        lock(&self.auto_approved).contains(skill)
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
        lock(&self.auto_approved).clear();
    }
}

fn skill_name(input: &Value) -> String {
    input_str(input, "skill")
        .or_else(|| input_str(input, "command"))
        .unwrap_or_default()
        .to_string()
}
