//! Group record union and the conversions between native and custom shapes.
//!
//! Native groups carry no tab list; a `GroupRecord::Native` therefore always
//! travels with the tabs the host reported for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::keywords::{extract_keywords, MAX_KEYWORDS};
use super::types::{CustomGroup, IntegratedGroup, NativeGroup, NativeGroupId, Tab, TabId, TabInfo};

/// Record id prefix for groups mirrored from a native group.
pub const NATIVE_ID_PREFIX: &str = "native-";

/// Record id prefix for groups created from a level-1 intent bucket.
pub const LEVEL1_ID_PREFIX: &str = "level1-";

/// Category given to groups mirrored from a native group.
pub const NATIVE_CATEGORY: &str = "native";

/// A group from either origin, or the merged view of both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupRecord {
    Native { group: NativeGroup, tabs: Vec<Tab> },
    Custom { group: CustomGroup },
    Integrated { group: IntegratedGroup },
}

impl GroupRecord {
    /// Member tab ids in ascending order, whatever the origin.
    pub fn sorted_tab_ids(&self) -> Vec<TabId> {
        match self {
            GroupRecord::Native { tabs, .. } => sorted_ids(tabs.iter().map(|t| t.id)),
            GroupRecord::Custom { group } => group.sorted_tab_ids(),
            GroupRecord::Integrated { group } => group.group.sorted_tab_ids(),
        }
    }

    /// Native group backing this record, if any.
    pub fn native_group_id(&self) -> Option<NativeGroupId> {
        match self {
            GroupRecord::Native { group, .. } => Some(group.id),
            GroupRecord::Custom { group } => parse_native_group_id(&group.id),
            GroupRecord::Integrated { group } => group.native_group_id,
        }
    }

    /// Convert into the unified view shape.
    pub fn into_integrated(self, now: DateTime<Utc>) -> IntegratedGroup {
        match self {
            GroupRecord::Native { group, tabs } => {
                let id = group.id;
                IntegratedGroup {
                    group: native_to_custom(&group, tabs, now),
                    is_native_group: true,
                    native_group_id: Some(id),
                }
            }
            GroupRecord::Custom { group } => IntegratedGroup {
                native_group_id: parse_native_group_id(&group.id),
                is_native_group: false,
                group,
            },
            GroupRecord::Integrated { group } => group,
        }
    }
}

/// Mirror a native group as a custom record with id `native-<id>`.
pub fn native_to_custom(native: &NativeGroup, tabs: Vec<Tab>, now: DateTime<Utc>) -> CustomGroup {
    let name = if native.title.trim().is_empty() {
        format!("Group {}", native.id)
    } else {
        native.title.clone()
    };

    let mut group = CustomGroup::with_id(native_record_id(native.id), &name, NATIVE_CATEGORY, now);
    for tab in tabs {
        group.upsert_tab(TabInfo::from_tab(tab, now));
    }
    group.keywords = extract_keywords(group.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
    group.set_confidence(1.0);
    group
}

/// Annotate a custom record as backed by a native group.
pub fn custom_backed_by_native(group: CustomGroup, native_id: NativeGroupId) -> IntegratedGroup {
    IntegratedGroup {
        group,
        is_native_group: true,
        native_group_id: Some(native_id),
    }
}

pub fn native_record_id(native_id: NativeGroupId) -> String {
    format!("{NATIVE_ID_PREFIX}{native_id}")
}

pub fn level1_record_id(native_id: NativeGroupId) -> String {
    format!("{LEVEL1_ID_PREFIX}{native_id}")
}

/// Recover the native group id from a `native-<id>` or `level1-<id>` record id.
pub fn parse_native_group_id(record_id: &str) -> Option<NativeGroupId> {
    record_id
        .strip_prefix(NATIVE_ID_PREFIX)
        .or_else(|| record_id.strip_prefix(LEVEL1_ID_PREFIX))
        .and_then(|rest| rest.parse().ok())
}

/// Collect ids into an ascending vector.
pub fn sorted_ids<I: IntoIterator<Item = TabId>>(ids: I) -> Vec<TabId> {
    let mut ids: Vec<TabId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids
}

/// Two groups are equivalent when their sorted tab-id lists are identical.
pub fn same_tab_set(a: &[TabId], b: &[TabId]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}
