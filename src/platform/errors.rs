//! Platform error types.

use thiserror::Error;

use crate::tabs::{NativeGroupId, TabId};

/// Errors reported by host platform calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    /// A referenced tab was closed between snapshot and mutation.
    #[error("no tab with id {tab_id}")]
    NoSuchTab { tab_id: TabId },

    /// A referenced native group no longer exists.
    #[error("no native group with id {group_id}")]
    NoSuchGroup { group_id: NativeGroupId },

    /// Any other host-side failure (permissions, disconnected port, …).
    #[error("host platform error: {reason}")]
    Host { reason: String },
}

impl PlatformError {
    /// Stale references are expected and never abort a run.
    pub fn is_stale_reference(&self) -> bool {
        matches!(
            self,
            PlatformError::NoSuchTab { .. } | PlatformError::NoSuchGroup { .. }
        )
    }
}
