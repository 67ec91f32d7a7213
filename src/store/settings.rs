//! User settings persisted alongside the groups.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How often automatic analysis runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupingFrequency {
    /// Only when the user asks.
    #[default]
    Manual,
    /// Whenever tabs are opened or navigate.
    OnTabChange,
    Hourly,
    Daily,
}

impl GroupingFrequency {
    /// Period between scheduled analyses, for the timed frequencies.
    pub fn interval(self) -> Option<Duration> {
        match self {
            GroupingFrequency::Hourly => Some(Duration::from_secs(60 * 60)),
            GroupingFrequency::Daily => Some(Duration::from_secs(24 * 60 * 60)),
            GroupingFrequency::Manual | GroupingFrequency::OnTabChange => None,
        }
    }
}

/// User-facing settings.
///
/// Stored as JSON under the settings key; unknown or missing fields fall back
/// to defaults so older records keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub ai_provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub enable_auto_grouping: bool,
    pub max_history_days: u32,
    pub grouping_frequency: GroupingFrequency,
    pub privacy_mode: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_provider: "workflow".to_string(),
            api_key: None,
            enable_auto_grouping: true,
            max_history_days: 30,
            grouping_frequency: GroupingFrequency::Manual,
            privacy_mode: false,
        }
    }
}

impl Settings {
    /// Return a copy with `patch` applied.
    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        if let Some(ref provider) = patch.ai_provider {
            next.ai_provider = provider.clone();
        }
        if let Some(ref key) = patch.api_key {
            // An empty string clears the stored key
            next.api_key = Some(key.clone()).filter(|k| !k.is_empty());
        }
        if let Some(v) = patch.enable_auto_grouping {
            next.enable_auto_grouping = v;
        }
        if let Some(v) = patch.max_history_days {
            next.max_history_days = v;
        }
        if let Some(v) = patch.grouping_frequency {
            next.grouping_frequency = v;
        }
        if let Some(v) = patch.privacy_mode {
            next.privacy_mode = v;
        }
        next
    }
}

/// Partial settings update from the options page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub ai_provider: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub enable_auto_grouping: Option<bool>,
    #[serde(default)]
    pub max_history_days: Option<u32>,
    #[serde(default)]
    pub grouping_frequency: Option<GroupingFrequency>,
    #[serde(default)]
    pub privacy_mode: Option<bool>,
}
