//! Tab and group data model shared by every layer.
//!
//! Field names serialize in camelCase because the same records are handed to
//! the extension's UI surfaces and persisted verbatim in the Group Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::classifier::types::IntentGroup;

/// Host-assigned tab id. Reused by the host after a tab closes.
pub type TabId = i64;

/// Host-assigned native group id.
pub type NativeGroupId = i64;

/// Host-assigned window id.
pub type WindowId = i64;

// ─── Tabs ───────────────────────────────────────────────────────────────────

/// A single open tab as reported by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub audible: bool,
    /// Native group membership. Hosts report `-1` for ungrouped tabs, which
    /// is normalized to `None` on the way in.
    #[serde(
        default,
        deserialize_with = "deserialize_group_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub group_id: Option<NativeGroupId>,
    pub window_id: WindowId,
}

fn deserialize_group_id<'de, D>(deserializer: D) -> Result<Option<NativeGroupId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<NativeGroupId>::deserialize(deserializer)?;
    Ok(raw.filter(|id| *id >= 0))
}

/// A tab enriched with derived and observed data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    #[serde(flatten)]
    pub tab: Tab,
    /// Host portion of the URL, empty when the URL has no host.
    pub domain: String,
    pub last_accessed: DateTime<Utc>,
    /// Extracted page text, if extraction succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl TabInfo {
    /// Wrap a host tab, deriving its domain.
    pub fn from_tab(tab: Tab, now: DateTime<Utc>) -> Self {
        let domain = super::domain::extract_domain(&tab.url).unwrap_or_default();
        Self {
            tab,
            domain,
            last_accessed: now,
            content: None,
        }
    }

    pub fn id(&self) -> TabId {
        self.tab.id
    }

    pub fn url(&self) -> &str {
        &self.tab.url
    }

    pub fn title(&self) -> &str {
        &self.tab.title
    }

    /// Refresh host-owned fields from a newer snapshot of the same tab.
    pub fn refresh(&mut self, tab: &Tab, now: DateTime<Utc>) {
        if tab.url != self.tab.url {
            self.domain = super::domain::extract_domain(&tab.url).unwrap_or_default();
            self.content = None;
        }
        self.tab = tab.clone();
        self.last_accessed = now;
    }
}

// ─── Native groups ──────────────────────────────────────────────────────────

/// Colors offered by the host's native grouping primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupColor {
    #[default]
    Grey,
    Blue,
    Red,
    Yellow,
    Green,
    Pink,
    Purple,
    Cyan,
    Orange,
}

impl GroupColor {
    pub const PALETTE: [GroupColor; 9] = [
        GroupColor::Grey,
        GroupColor::Blue,
        GroupColor::Red,
        GroupColor::Yellow,
        GroupColor::Green,
        GroupColor::Pink,
        GroupColor::Purple,
        GroupColor::Cyan,
        GroupColor::Orange,
    ];

    /// Palette color for the `index`-th group of a run.
    pub fn cycle(index: usize) -> Self {
        Self::PALETTE[index % Self::PALETTE.len()]
    }
}

/// The host's native tab group. Membership lives on the tabs, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeGroup {
    pub id: NativeGroupId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub color: GroupColor,
    #[serde(default)]
    pub collapsed: bool,
    pub window_id: WindowId,
}

/// Properties for a native group creation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeGroupProps {
    pub title: String,
    pub color: GroupColor,
    pub collapsed: bool,
}

/// Partial update for an existing native group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NativeGroupPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<GroupColor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
}

/// Filter for native group queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl GroupQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, group: &NativeGroup) -> bool {
        self.window_id.map_or(true, |w| w == group.window_id)
            && self.title.as_ref().map_or(true, |t| *t == group.title)
    }
}

// ─── Custom groups ──────────────────────────────────────────────────────────

/// The extension's own persisted grouping record.
///
/// Invariants: tab ids are unique, `confidence` lies in `[0, 1]`, and every id
/// referenced by `intent_analysis` also appears in `tabs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tabs: Vec<TabInfo>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_analysis: Option<IntentGroup>,
}

impl CustomGroup {
    /// Create a group with a fresh synthetic id.
    pub fn new(name: &str, category: &str, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name, category, now)
    }

    pub fn with_id(id: String, name: &str, category: &str, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.to_string(),
            description: String::new(),
            tabs: Vec::new(),
            keywords: Vec::new(),
            category: category.to_string(),
            created_at: now,
            updated_at: now,
            confidence: 0.0,
            intent_analysis: None,
        }
    }

    /// Member tab ids in ascending order.
    pub fn sorted_tab_ids(&self) -> Vec<TabId> {
        let mut ids: Vec<TabId> = self.tabs.iter().map(TabInfo::id).collect();
        ids.sort_unstable();
        ids
    }

    pub fn contains_tab(&self, tab_id: TabId) -> bool {
        self.tabs.iter().any(|t| t.id() == tab_id)
    }

    /// Add a tab, replacing any existing entry with the same id.
    pub fn upsert_tab(&mut self, tab: TabInfo) {
        match self.tabs.iter_mut().find(|t| t.id() == tab.id()) {
            Some(existing) => *existing = tab,
            None => self.tabs.push(tab),
        }
    }

    /// Remove a tab by id. Returns whether it was present.
    pub fn remove_tab(&mut self, tab_id: TabId) -> bool {
        let before = self.tabs.len();
        self.tabs.retain(|t| t.id() != tab_id);
        if self.tabs.len() == before {
            return false;
        }
        self.prune_intent_analysis();
        true
    }

    pub fn set_confidence(&mut self, confidence: f64) {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
    }

    /// Drop intent-analysis references to tabs no longer in the group.
    pub fn prune_intent_analysis(&mut self) {
        let Some(analysis) = self.intent_analysis.as_mut() else {
            return;
        };
        let live: Vec<TabId> = self.tabs.iter().map(TabInfo::id).collect();
        for sub in &mut analysis.subcategories {
            sub.tab_ids.retain(|id| live.contains(id));
        }
        analysis.subcategories.retain(|sub| !sub.tab_ids.is_empty());
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }
}

/// View-level union of custom and native groups for UI listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedGroup {
    #[serde(flatten)]
    pub group: CustomGroup,
    pub is_native_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_group_id: Option<NativeGroupId>,
}

// ─── Tests ──────────────────────────────────────────────────────────────────
