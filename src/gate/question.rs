use std::sync::Arc;

use serde_json::{Map, Value};

use super::approval::{MISSING_TOOL_USE_ID, REQUEST_CANCELLED, UI_UNAVAILABLE};
use super::broker::ToolUseContext;
use super::registry::{RequestRegistry, Settlement};
use super::ui::{UiChannel, UiRequest};
use crate::types::PermissionResult;
use crate::util::with_fields;

const QUESTION_CANCELLED: &str = "The user cancelled the question";

/// Answers keyed by question text.
pub type Answers = Map<String, Value>;

/// Brokers `AskUserQuestion`. A `None` answer means the user dismissed it.
#[derive(Debug)]
pub struct QuestionManager {
    registry: RequestRegistry<Option<Answers>, Option<String>>,
    ui: Arc<UiChannel>,
}

impl QuestionManager {
    pub fn new(ui: Arc<UiChannel>) -> Self {
        Self {
            registry: RequestRegistry::new(),
            ui,
        }
    }

    pub async fn ask(&self, input: &Value, ctx: &ToolUseContext) -> PermissionResult {
        let questions = input.get("questions").cloned().unwrap_or(Value::Null);
        let has_questions = questions.as_array().is_some_and(|items| !items.is_empty());
        if !has_questions {
            let answers = Value::Object(Map::new());
            return PermissionResult::allow(with_fields(input, [("answers", answers)]));
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
        self.ui.post(UiRequest::Question {
            tool_use_id: tool_use_id.to_string(),
            questions,
            parent_tool_use_id: ctx.parent_tool_use_id.clone(),
        });

        match self.registry.settle(request, &ctx.cancel).await {
            Settlement::Resolved(Some(answers)) => {
                PermissionResult::allow(with_fields(input, [("answers", Value::Object(answers))]))
            }
            Settlement::Resolved(None) => PermissionResult::interrupt(QUESTION_CANCELLED),
            Settlement::Cancelled(Some(_)) => {
                self.ui.post(UiRequest::RequestCancelled {
                    tool_use_id: tool_use_id.to_string(),
                });
                PermissionResult::interrupt(REQUEST_CANCELLED)
            }
            Settlement::Cancelled(None) | Settlement::Dropped => {
                PermissionResult::interrupt(REQUEST_CANCELLED)
            }
        }
    }

    pub fn resolve(&self, tool_use_id: &str, answers: Option<Answers>) -> bool {
        self.registry.resolve(tool_use_id, answers).is_some()
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn teardown(&self) {
        for request in self.registry.drain() {
            let tool_use_id = request.id.clone();
            request.resolve(None);
            self.ui.post(UiRequest::RequestCancelled { tool_use_id });
        }
    }
}
