//! Tool gating broker.
//!
//! [`ToolGate::can_use_tool`] answers immediately or parks a request until the
//! UI resolves it or the call's cancellation token fires.

pub mod approval;
pub mod broker;
pub mod confirm;
pub mod decision;
pub mod diff;
pub mod plan;
pub mod question;
pub mod registry;
pub mod session;
pub mod skill;
pub mod ui;

pub use approval::{ApprovalKind, ApprovalManager, ApprovalMeta, EDIT_TARGET_NOT_FOUND};
pub use broker::{ToolGate, ToolRoute, ToolUseContext};
pub use confirm::{ConfirmHandler, ConfirmRequest};
pub use decision::Decision;
pub use diff::{DiffManager, FileChange, LocalDiffManager, PreparedDiff};
pub use plan::PlanManager;
pub use question::{Answers, QuestionManager};
pub use registry::{PendingRequest, RequestRegistry, Settlement};
pub use session::SessionFlags;
pub use skill::SkillManager;
pub use ui::{UiChannel, UiRequest, UiSink};
