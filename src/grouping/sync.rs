//! Native/custom sync bookkeeping.
//!
//! Native groups own membership on the host; custom groups are the
//! extension's persisted view. This module keeps the two aligned:
//! - `NativeIndex`: which native group (if any) is equivalent to a tab set
//! - `create_group_tolerant`: native creation that survives tabs closing mid-call
//! - `integrate`: the unified list shown by the UI
//! - pure edits applied to the stored group list on lifecycle events

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::platform::{NativeGroupAdapter, PlatformError};
use crate::tabs::keywords::{extract_keywords, MAX_KEYWORDS};
use crate::tabs::records::{
    custom_backed_by_native, level1_record_id, native_record_id, parse_native_group_id,
    same_tab_set, sorted_ids,
};
use crate::tabs::{
    CustomGroup, GroupRecord, IntegratedGroup, NativeGroup, NativeGroupId, NativeGroupProps, Tab,
    TabId, TabInfo,
};

// ─── Native index ───────────────────────────────────────────────────────────

/// Native groups keyed by their sorted member tab ids.
#[derive(Debug, Default)]
pub struct NativeIndex {
    entries: Vec<(NativeGroup, Vec<TabId>)>,
}

impl NativeIndex {
    /// Build from the host's groups and a tab snapshot carrying `group_id`.
    pub fn from_snapshot(groups: Vec<NativeGroup>, tabs: &[Tab]) -> Self {
        let mut members: HashMap<NativeGroupId, Vec<TabId>> = HashMap::new();
        for tab in tabs {
            if let Some(gid) = tab.group_id {
                members.entry(gid).or_default().push(tab.id);
            }
        }
        let entries = groups
            .into_iter()
            .map(|g| {
                let ids = sorted_ids(members.remove(&g.id).unwrap_or_default());
                (g, ids)
            })
            .collect();
        Self { entries }
    }

    /// The native group whose members are exactly `sorted_ids`.
    pub fn find_equivalent(&self, sorted_ids: &[TabId]) -> Option<&NativeGroup> {
        if sorted_ids.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, ids)| same_tab_set(ids, sorted_ids))
            .map(|(g, _)| g)
    }

    /// Record a group created (or re-titled) during this run.
    ///
    /// Its tabs left whatever group they were in, so those memberships are
    /// dropped from the other entries.
    pub fn insert(&mut self, group: NativeGroup, tab_ids: Vec<TabId>) {
        let moved: HashSet<TabId> = tab_ids.iter().copied().collect();
        for (_, ids) in &mut self.entries {
            ids.retain(|id| !moved.contains(id));
        }
        self.entries.retain(|(g, _)| g.id != group.id);
        self.entries.push((group, sorted_ids(tab_ids)));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Tolerant creation ──────────────────────────────────────────────────────

/// Create a native group, dropping tabs the host reports as gone.
///
/// Returns the new id and the ids that actually joined, or `None` when every
/// tab vanished. Other host errors propagate.
pub async fn create_group_tolerant(
    adapter: &dyn NativeGroupAdapter,
    tab_ids: &[TabId],
    props: &NativeGroupProps,
) -> Result<Option<(NativeGroupId, Vec<TabId>)>, PlatformError> {
    let mut remaining: Vec<TabId> = tab_ids.to_vec();
    loop {
        if remaining.is_empty() {
            return Ok(None);
        }
        match adapter.create_group(&remaining, props).await {
            Ok(group_id) => return Ok(Some((group_id, remaining))),
            Err(PlatformError::NoSuchTab { tab_id }) if remaining.contains(&tab_id) => {
                tracing::info!(tab_id, title = %props.title, "tab closed before grouping, retrying without it");
                remaining.retain(|id| *id != tab_id);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Ungroup tabs, skipping ones the host reports as gone.
pub async fn ungroup_tolerant(
    adapter: &dyn NativeGroupAdapter,
    tab_ids: &[TabId],
) -> Result<Vec<TabId>, PlatformError> {
    let mut remaining: Vec<TabId> = tab_ids.to_vec();
    loop {
        if remaining.is_empty() {
            return Ok(remaining);
        }
        match adapter.ungroup_tabs(&remaining).await {
            Ok(()) => return Ok(remaining),
            Err(PlatformError::NoSuchTab { tab_id }) if remaining.contains(&tab_id) => {
                tracing::info!(tab_id, "tab closed before ungrouping, retrying without it");
                remaining.retain(|id| *id != tab_id);
            }
            Err(e) => return Err(e),
        }
    }
}

// ─── Integrated view ────────────────────────────────────────────────────────

/// Merge live native groups with stored custom groups into one list.
///
/// Each native group appears once. Its `level1-<id>` record supplies the name
/// and intent breakdown when present; any stored group with exactly the same
/// tab set is treated as the same group and not listed again.
pub fn integrate(
    natives: Vec<(NativeGroup, Vec<Tab>)>,
    customs: Vec<CustomGroup>,
    now: DateTime<Utc>,
) -> Vec<IntegratedGroup> {
    let mut consumed: HashSet<String> = HashSet::new();
    let mut live_natives: HashSet<NativeGroupId> = HashSet::new();
    let mut out = Vec::with_capacity(natives.len() + customs.len());

    for (native, tabs) in natives {
        if tabs.is_empty() {
            continue;
        }
        live_natives.insert(native.id);
        let ids = sorted_ids(tabs.iter().map(|t| t.id));

        let level1_id = level1_record_id(native.id);
        let record = customs.iter().find(|c| c.id == level1_id);

        let view = match record {
            Some(custom) => {
                let mut group = custom.clone();
                align_tabs(&mut group, &tabs, now);
                custom_backed_by_native(group, native.id)
            }
            None => GroupRecord::Native {
                group: native.clone(),
                tabs,
            }
            .into_integrated(now),
        };

        consumed.insert(level1_id);
        consumed.insert(native_record_id(native.id));
        for custom in &customs {
            if !consumed.contains(&custom.id) && same_tab_set(&custom.sorted_tab_ids(), &ids) {
                consumed.insert(custom.id.clone());
            }
        }
        out.push(view);
    }

    for custom in customs {
        if consumed.contains(&custom.id) || custom.is_empty() {
            continue;
        }
        let mut view = GroupRecord::Custom { group: custom }.into_integrated(now);
        if view
            .native_group_id
            .map_or(false, |nid| !live_natives.contains(&nid))
        {
            view.native_group_id = None;
        }
        out.push(view);
    }

    out
}

/// Replace a stored record's tabs with the native group's live members,
/// keeping stored enrichment for tabs that are still there.
fn align_tabs(group: &mut CustomGroup, live: &[Tab], now: DateTime<Utc>) {
    let mut tabs = Vec::with_capacity(live.len());
    for tab in live {
        let info = match group.tabs.iter().find(|t| t.id() == tab.id) {
            Some(existing) => {
                let mut info = existing.clone();
                if info.tab != *tab {
                    info.refresh(tab, now);
                }
                info
            }
            None => TabInfo::from_tab(tab.clone(), now),
        };
        tabs.push(info);
    }
    group.tabs = tabs;
    group.prune_intent_analysis();
}

// ─── Stored-list edits ──────────────────────────────────────────────────────

/// Remove a closed tab from every group; groups left empty are dropped.
pub fn remove_tab_from_groups(groups: &mut Vec<CustomGroup>, tab_id: TabId, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for group in groups.iter_mut() {
        if group.remove_tab(tab_id) {
            group.updated_at = now;
            changed = true;
        }
    }
    let before = groups.len();
    groups.retain(|g| !g.is_empty());
    changed || groups.len() != before
}

/// Refresh a navigated or retitled tab wherever it is stored.
pub fn refresh_tab_in_groups(groups: &mut [CustomGroup], tab: &Tab, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    for group in groups.iter_mut() {
        let Some(info) = group.tabs.iter_mut().find(|t| t.id() == tab.id) else {
            continue;
        };
        info.refresh(tab, now);
        group.keywords = extract_keywords(group.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
        group.updated_at = now;
        changed = true;
    }
    changed
}

/// Drop the stored records mirroring a native group that the host removed.
pub fn remove_groups_for_native(groups: &mut Vec<CustomGroup>, native_id: NativeGroupId) -> bool {
    let before = groups.len();
    groups.retain(|g| parse_native_group_id(&g.id) != Some(native_id));
    groups.len() != before
}

/// Drop tabs not accessed within `max_age`; groups left empty are dropped.
pub fn prune_stale_tabs(groups: &mut Vec<CustomGroup>, max_age: Duration, now: DateTime<Utc>) -> bool {
    let cutoff = now - max_age;
    let mut changed = false;
    for group in groups.iter_mut() {
        let before = group.tabs.len();
        group.tabs.retain(|t| t.last_accessed >= cutoff);
        if group.tabs.len() != before {
            group.prune_intent_analysis();
            changed = true;
        }
    }
    let before = groups.len();
    groups.retain(|g| !g.is_empty());
    changed || groups.len() != before
}

/// Take the winners' tabs away from every other stored group.
///
/// Keeps each tab in at most one stored group after a run. Groups left empty
/// are dropped.
pub fn claim_tabs(groups: &mut Vec<CustomGroup>, winners: &[CustomGroup], now: DateTime<Utc>) -> bool {
    let winner_ids: HashSet<&str> = winners.iter().map(|g| g.id.as_str()).collect();
    let claimed: HashSet<TabId> = winners
        .iter()
        .flat_map(|g| g.tabs.iter().map(TabInfo::id))
        .collect();

    let mut changed = false;
    for group in groups.iter_mut() {
        if winner_ids.contains(group.id.as_str()) {
            continue;
        }
        let before = group.tabs.len();
        group.tabs.retain(|t| !claimed.contains(&t.id()));
        if group.tabs.len() != before {
            group.prune_intent_analysis();
            group.updated_at = now;
            changed = true;
        }
    }
    let before = groups.len();
    groups.retain(|g| !g.is_empty());
    changed || groups.len() != before
}

// ─── Tests ──────────────────────────────────────────────────────────────────
