//! Grouping error types.

use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::platform::PlatformError;
use crate::store::StoreError;
use crate::tabs::TabId;

/// Errors that can occur while analyzing and reconciling tab groups.
///
/// Only the whole-operation variants (`ClassifierUnavailable`,
/// `ClassifierMalformed`, `StoreWriteFailed`, `Store`, `Platform`, `Cancelled`)
/// escape a run. `StaleTabReference` and `NativeGroupCreateFailed` are
/// per-bucket and end up logged in the run report instead.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GroupingError {
    /// Network or HTTP failure reaching the classifier.
    #[error("classifier unavailable: {reason}")]
    ClassifierUnavailable { reason: String },

    /// The classifier answered with something that is not a usable result.
    #[error("classifier returned malformed output: {reason}")]
    ClassifierMalformed { reason: String },

    /// A tab vanished between snapshot and mutation.
    #[error("tab {tab_id} no longer exists")]
    StaleTabReference { tab_id: TabId },

    /// Native group creation failed for one bucket.
    #[error("failed to create native group for '{bucket}': {reason}")]
    NativeGroupCreateFailed { bucket: String, reason: String },

    /// One or more independent store writes failed.
    #[error("{} store write(s) failed: {}", failures.len(), failures.join("; "))]
    StoreWriteFailed { failures: Vec<String> },

    /// Reading from the store failed before any mutation.
    #[error("store error: {reason}")]
    Store { reason: String },

    /// Host platform failure outside any single bucket (e.g. snapshot query).
    #[error("platform error: {0}")]
    Platform(PlatformError),

    /// The owning surface went away before the run finished.
    #[error("run cancelled")]
    Cancelled,
}

impl GroupingError {
    /// Whether a user-triggered retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GroupingError::ClassifierUnavailable { .. }
                | GroupingError::StoreWriteFailed { .. }
                | GroupingError::Store { .. }
                | GroupingError::Platform(_)
        )
    }
}

impl From<ClassifierError> for GroupingError {
    fn from(e: ClassifierError) -> Self {
        if e.is_unavailable() {
            GroupingError::ClassifierUnavailable {
                reason: e.to_string(),
            }
        } else {
            GroupingError::ClassifierMalformed {
                reason: e.to_string(),
            }
        }
    }
}

impl From<PlatformError> for GroupingError {
    fn from(e: PlatformError) -> Self {
        match e {
            PlatformError::NoSuchTab { tab_id } => GroupingError::StaleTabReference { tab_id },
            other => GroupingError::Platform(other),
        }
    }
}

impl From<StoreError> for GroupingError {
    fn from(e: StoreError) -> Self {
        GroupingError::Store {
            reason: e.to_string(),
        }
    }
}
