//! Host commands for analysis, the integrated group list, and tab events.

use serde::Serialize;

use crate::grouping::{EventOutcome, ReconcileReport, TabEvent, TriggerOutcome};
use crate::tabs::{IntegratedGroup, NativeGroupId};
use crate::TabMind;

// ─── Response Types ─────────────────────────────────────────────────────────

/// Result of an analyze request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalyzeResponse {
    /// This request drove the run; the report is from its final pass.
    Completed { report: ReconcileReport },
    /// A run was already active and will rerun once it finishes.
    Coalesced,
}

/// Result of dissolving a native group.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DissolveResponse {
    pub native_group_id: NativeGroupId,
    pub ungrouped_tabs: usize,
}

// ─── Commands ───────────────────────────────────────────────────────────────

/// Analyze the open tabs and group them.
///
/// A classifier failure leaves every group untouched; the message is meant
/// for a banner with a retry action.
pub async fn analyze_tabs(state: &TabMind) -> Result<AnalyzeResponse, String> {
    match state.grouping().analyze(state.cancel_token()).await {
        TriggerOutcome::Completed(Ok(report)) => Ok(AnalyzeResponse::Completed { report }),
        TriggerOutcome::Completed(Err(e)) => {
            tracing::warn!(error = %e, retryable = e.is_retryable(), "analysis failed");
            Err(format!("Analysis failed: {e}"))
        }
        TriggerOutcome::Coalesced => Ok(AnalyzeResponse::Coalesced),
    }
}

/// Cancel the active analysis. Buckets already grouped are kept.
pub fn cancel_analysis(state: &TabMind) {
    state.cancel_analysis();
}

/// Unified list of native groups and stored custom groups.
pub async fn list_groups(state: &TabMind) -> Result<Vec<IntegratedGroup>, String> {
    state
        .grouping()
        .list_groups()
        .await
        .map_err(|e| format!("Failed to list groups: {e}"))
}

/// Ungroup a native group's tabs and forget its stored records.
pub async fn dissolve_group(
    state: &TabMind,
    native_group_id: NativeGroupId,
) -> Result<DissolveResponse, String> {
    let ungrouped_tabs = state
        .grouping()
        .dissolve_group(native_group_id)
        .await
        .map_err(|e| format!("Failed to ungroup: {e}"))?;
    Ok(DissolveResponse {
        native_group_id,
        ungrouped_tabs,
    })
}

/// Apply a host lifecycle event (tab created/updated/moved/removed, group removed).
pub async fn handle_tab_event(state: &TabMind, event: TabEvent) -> Result<EventOutcome, String> {
    state
        .grouping()
        .handle_event(event, state.cancel_token())
        .await
        .map_err(|e| format!("Failed to apply tab event: {e}"))
}

// ─── Tests ──────────────────────────────────────────────────────────────────
