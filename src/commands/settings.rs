//! Host commands for the options page.
//!
//! Settings live in the group store next to the groups, so a partial update
//! from the options page is merged and written in one step.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::{Settings, SettingsPatch};
use crate::TabMind;

/// Sync status shown under the analyze button.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub run_state: crate::grouping::RunState,
}

pub async fn get_settings(state: &TabMind) -> Result<Settings, String> {
    state
        .store()
        .get_settings()
        .await
        .map_err(|e| format!("Failed to load settings: {e}"))
}

/// Merge a partial update and return the resulting settings.
pub async fn update_settings(state: &TabMind, patch: SettingsPatch) -> Result<Settings, String> {
    let settings = state
        .store()
        .update_settings(&patch)
        .await
        .map_err(|e| format!("Failed to save settings: {e}"))?;
    tracing::info!(
        auto_grouping = settings.enable_auto_grouping,
        frequency = ?settings.grouping_frequency,
        privacy_mode = settings.privacy_mode,
        max_history_days = settings.max_history_days,
        "settings updated"
    );
    Ok(settings)
}

/// When the last analysis completed and whether one is running now.
pub async fn get_sync_status(state: &TabMind) -> Result<SyncStatus, String> {
    let last_sync = state
        .store()
        .last_sync()
        .await
        .map_err(|e| format!("Failed to read last sync: {e}"))?;
    Ok(SyncStatus {
        last_sync,
        run_state: state.grouping().coordinator().state(),
    })
}
