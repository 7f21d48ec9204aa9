//! Error classification shared by the engine and the gate.

use serde::{Deserialize, Serialize};

/// Broad error category used to decide whether a fault is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// User-initiated or programmatic abort; never reported.
    Abort,
    Stream,
    Configuration,
    Serialization,
    Io,
    Unknown,
}

/// Message fragments that identify a user-initiated abort coming out of the
/// runtime transport.
pub(crate) const USER_ABORT_SIGNATURES: &[&str] = &[
    "aborted by user",
    "aborterror",
    "request was aborted",
    "operation was aborted",
];

/// Whether an error message carries a recognized user-abort signature.
pub fn is_abort_message(message: &str) -> bool {
    let lowered = message.to_ascii_lowercase();
    USER_ABORT_SIGNATURES
        .iter()
        .any(|signature| lowered.contains(signature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_signatures_match_case_insensitively() {
        assert!(is_abort_message("Claude Code process aborted by user"));
        assert!(is_abort_message("AbortError: The operation was aborted"));
        assert!(is_abort_message("request was ABORTED"));
        assert!(!is_abort_message("connection reset by peer"));
    }
}
