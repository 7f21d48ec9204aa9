//! Session-wide permission flags shared by the policy managers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::types::PermissionMode;
use crate::util::{read, write};

#[derive(Debug, Default)]
pub struct SessionFlags {
    mode: RwLock<PermissionMode>,
    skip_permissions: AtomicBool,
}

impl SessionFlags {
    pub fn new(mode: PermissionMode, skip_permissions: bool) -> Self {
        Self {
            mode: RwLock::new(mode),
            skip_permissions: AtomicBool::new(skip_permissions),
        }
    }

    pub fn mode(&self) -> PermissionMode {
        *read(&self.mode)
    }

    pub fn set_mode(&self, mode: PermissionMode) {
        let previous = std::mem::replace(&mut *write(&self.mode), mode);
        if previous != mode {
            tracing::debug!(%previous, %mode, "permission mode changed");
        }
    }

    pub fn skip_permissions(&self) -> bool {
        self.skip_permissions.load(Ordering::SeqCst)
    }

    pub fn set_skip_permissions(&self, skip: bool) {
        self.skip_permissions.store(skip, Ordering::SeqCst);
    }

    /// File edits need no review in the current mode.
    pub fn edits_auto_approved(&self) -> bool {
        self.skip_permissions()
            || matches!(
                self.mode(),
                PermissionMode::AcceptEdits | PermissionMode::BypassPermissions
            )
    }

    pub fn in_plan_mode(&self) -> bool {
        self.mode() == PermissionMode::Plan
    }
}
