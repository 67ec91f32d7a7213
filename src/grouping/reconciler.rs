//! Group Reconciler: classifier output + tab snapshot → group mutations.
//!
//! Two paths:
//! 1. **Two-level** (`intent_level1` → subcategories): validate, plan one
//!    bucket per level-1 intent, then materialize each bucket as a native group
//!    (reusing an equivalent one when it already exists) plus a `level1-<id>`
//!    custom record.
//! 2. **Flat** (`{id: category, tab_ids}`): store-only. Each category becomes a
//!    candidate group that either merges into a similar stored group or is
//!    added as a new one.
//!
//! A tab id claimed by one bucket is never placed in a later bucket of the
//! same response. Per-bucket failures are reported, never raised.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::errors::GroupingError;
use super::similarity::{best_match, merge_groups, should_merge};
use super::sync::{create_group_tolerant, NativeIndex};
use crate::classifier::types::{CategoryAssignment, IntentGroup, IntentSubcategory, RawIntentEntry};
use crate::platform::NativeGroupAdapter;
use crate::tabs::keywords::{extract_keywords, MAX_KEYWORDS};
use crate::tabs::records::{level1_record_id, sorted_ids};
use crate::tabs::{
    CustomGroup, GroupColor, NativeGroup, NativeGroupId, NativeGroupPatch, NativeGroupProps, TabId,
    TabInfo,
};

// ─── Report types ───────────────────────────────────────────────────────────

/// Why a bucket produced no group.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Entry had no usable `intent_level1`.
    MissingIntent,
    /// `subcategories` was absent, not an array, or empty.
    NoSubcategories,
    /// No subcategory carried any tab id.
    NoTabIds,
    /// Every referenced tab was stale or claimed by an earlier bucket.
    NoLiveTabs,
    /// The host refused to create the native group.
    CreateFailed { detail: String },
    /// The run was cancelled before this bucket's first platform call.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedBucket {
    pub name: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// A tab id that appeared in more than one bucket of the same response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabConflict {
    pub tab_id: TabId,
    pub kept_in: String,
    pub dropped_from: String,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Groups to persist, in bucket order.
    pub groups: Vec<CustomGroup>,
    pub created_native: usize,
    pub reused_native: usize,
    pub skipped: Vec<SkippedBucket>,
    pub conflicts: Vec<TabConflict>,
    pub cancelled: bool,
}

// ─── Id claiming ────────────────────────────────────────────────────────────

/// First-bucket-wins assignment of tab ids across one response.
#[derive(Debug, Default)]
struct Claims {
    owner: HashMap<TabId, String>,
    conflicts: Vec<TabConflict>,
}

impl Claims {
    /// Keep the ids of `ids` that are positive, present in `live`, and not
    /// already owned by another bucket. Duplicates within the bucket collapse.
    fn claim(&mut self, bucket: &str, ids: &[TabId], live: &HashSet<TabId>) -> Vec<TabId> {
        let mut kept = Vec::new();
        for &id in ids {
            if id <= 0 || !live.contains(&id) {
                continue;
            }
            match self.owner.get(&id) {
                // Repeated within this bucket
                Some(owner) if owner == bucket => {}
                Some(owner) => {
                    tracing::warn!(
                        tab_id = id,
                        kept_in = %owner,
                        dropped_from = %bucket,
                        "tab assigned to two buckets, keeping first"
                    );
                    self.conflicts.push(TabConflict {
                        tab_id: id,
                        kept_in: owner.clone(),
                        dropped_from: bucket.to_string(),
                    });
                }
                None => {
                    self.owner.insert(id, bucket.to_string());
                    kept.push(id);
                }
            }
        }
        kept
    }
}

// ─── Two-level path: validation ─────────────────────────────────────────────

/// Validate raw two-level entries, dropping the unusable ones.
///
/// An entry survives when it has a non-blank `intent_level1` and at least one
/// subcategory with at least one integer tab id. Subcategories without ids
/// are dropped from surviving entries.
pub fn validate_intent_entries(raw: Vec<RawIntentEntry>) -> (Vec<IntentGroup>, Vec<SkippedBucket>) {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();

    for entry in raw {
        let name = entry
            .intent_level1
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if name.is_empty() {
            skipped.push(SkippedBucket {
                name,
                reason: SkipReason::MissingIntent,
            });
            continue;
        }

        let items = match entry.subcategories {
            Value::Array(items) if !items.is_empty() => items,
            _ => {
                tracing::info!(bucket = %name, "dropping intent without subcategories");
                skipped.push(SkippedBucket {
                    name,
                    reason: SkipReason::NoSubcategories,
                });
                continue;
            }
        };

        let subcategories: Vec<IntentSubcategory> = items
            .iter()
            .filter_map(parse_subcategory)
            .filter(|sub| !sub.tab_ids.is_empty())
            .collect();
        if subcategories.is_empty() {
            tracing::info!(bucket = %name, "dropping intent whose subcategories carry no tab ids");
            skipped.push(SkippedBucket {
                name,
                reason: SkipReason::NoTabIds,
            });
            continue;
        }

        valid.push(IntentGroup {
            intent_level1: name,
            intent_level1_description: entry.intent_level1_description.unwrap_or_default(),
            subcategories,
        });
    }

    (valid, skipped)
}

fn parse_subcategory(value: &Value) -> Option<IntentSubcategory> {
    let obj = value.as_object()?;
    let intent_level2 = obj
        .get("intent_level2")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tab_ids = obj
        .get("tab_ids")
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
        .unwrap_or_default();
    Some(IntentSubcategory {
        intent_level2,
        tab_ids,
    })
}

// ─── Two-level path: planning ───────────────────────────────────────────────

/// One level-1 intent, narrowed to live, unclaimed tabs.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentBucket {
    /// Breakdown restricted to `tab_ids`.
    pub intent: IntentGroup,
    /// Live member ids in first-seen order.
    pub tab_ids: Vec<TabId>,
    /// Distinct ids the classifier referenced, stale ones included.
    pub requested: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentPlan {
    pub buckets: Vec<IntentBucket>,
    pub conflicts: Vec<TabConflict>,
    pub skipped: Vec<SkippedBucket>,
}

/// Narrow validated intents to the snapshot and resolve cross-bucket ids.
pub fn plan_intent_buckets(groups: Vec<IntentGroup>, live: &HashSet<TabId>) -> IntentPlan {
    let mut claims = Claims::default();
    let mut plan = IntentPlan::default();

    for mut intent in groups {
        let requested = intent.referenced_tab_ids().len();
        let bucket_name = intent.intent_level1.clone();

        // The bucket's id union is deduplicated; a subcategory keeps every id
        // the bucket owns, even one an earlier sibling subcategory listed too.
        let mut tab_ids: Vec<TabId> = Vec::new();
        for sub in &mut intent.subcategories {
            tab_ids.extend(claims.claim(&bucket_name, &sub.tab_ids, live));
            let mut own: Vec<TabId> = Vec::with_capacity(sub.tab_ids.len());
            for id in &sub.tab_ids {
                if tab_ids.contains(id) && !own.contains(id) {
                    own.push(*id);
                }
            }
            sub.tab_ids = own;
        }
        intent.subcategories.retain(|sub| !sub.tab_ids.is_empty());

        if tab_ids.is_empty() {
            tracing::info!(bucket = %bucket_name, requested, "no live tabs left in bucket, skipping");
            plan.skipped.push(SkippedBucket {
                name: bucket_name,
                reason: SkipReason::NoLiveTabs,
            });
            continue;
        }

        plan.buckets.push(IntentBucket {
            intent,
            tab_ids,
            requested,
        });
    }

    plan.conflicts = claims.conflicts;
    plan
}

// ─── Two-level path: apply ──────────────────────────────────────────────────

/// Materialize planned buckets as native groups and `level1-<id>` records.
///
/// Buckets are independent: a failure is recorded in `skipped` and the next
/// bucket proceeds. Cancellation is checked before each bucket's first
/// platform call; calls already issued run to completion.
pub async fn apply_intent_plan(
    adapter: &dyn NativeGroupAdapter,
    plan: IntentPlan,
    snapshot: &HashMap<TabId, TabInfo>,
    index: &mut NativeIndex,
    cancel: &CancellationToken,
    now: DateTime<Utc>,
) -> ReconcileReport {
    let mut report = ReconcileReport {
        skipped: plan.skipped,
        conflicts: plan.conflicts,
        ..ReconcileReport::default()
    };

    for (position, bucket) in plan.buckets.into_iter().enumerate() {
        let name = bucket.intent.intent_level1.clone();

        if cancel.is_cancelled() {
            if !report.cancelled {
                tracing::info!(bucket = %name, "run cancelled, skipping remaining buckets");
            }
            report.cancelled = true;
            report.skipped.push(SkippedBucket {
                name,
                reason: SkipReason::Cancelled,
            });
            continue;
        }

        let sorted = sorted_ids(bucket.tab_ids.iter().copied());
        let (native_id, members) = match index.find_equivalent(&sorted).cloned() {
            Some(existing) => {
                reuse_native(adapter, &existing, &name).await;
                report.reused_native += 1;
                index.insert(
                    NativeGroup {
                        title: name.clone(),
                        ..existing.clone()
                    },
                    sorted.clone(),
                );
                (existing.id, bucket.tab_ids.clone())
            }
            None => {
                let props = NativeGroupProps {
                    title: name.clone(),
                    color: GroupColor::cycle(position),
                    collapsed: false,
                };
                match create_group_tolerant(adapter, &bucket.tab_ids, &props).await {
                    Ok(Some((native_id, joined))) => {
                        report.created_native += 1;
                        let window_id = joined
                            .first()
                            .and_then(|id| snapshot.get(id))
                            .map(|t| t.tab.window_id)
                            .unwrap_or_default();
                        index.insert(
                            NativeGroup {
                                id: native_id,
                                title: props.title.clone(),
                                color: props.color,
                                collapsed: props.collapsed,
                                window_id,
                            },
                            joined.clone(),
                        );
                        tracing::info!(
                            bucket = %name,
                            native_id,
                            tab_count = joined.len(),
                            color = ?props.color,
                            "native group created"
                        );
                        (native_id, joined)
                    }
                    Ok(None) => {
                        tracing::info!(bucket = %name, "every tab closed before grouping, skipping");
                        report.skipped.push(SkippedBucket {
                            name,
                            reason: SkipReason::NoLiveTabs,
                        });
                        continue;
                    }
                    Err(e) => {
                        let err = GroupingError::NativeGroupCreateFailed {
                            bucket: name.clone(),
                            reason: e.to_string(),
                        };
                        tracing::warn!(error = %err, "bucket skipped");
                        report.skipped.push(SkippedBucket {
                            name,
                            reason: SkipReason::CreateFailed {
                                detail: e.to_string(),
                            },
                        });
                        continue;
                    }
                }
            }
        };

        report
            .groups
            .push(build_level1_group(native_id, bucket, &members, snapshot, now));
    }

    tracing::info!(
        groups = report.groups.len(),
        created = report.created_native,
        reused = report.reused_native,
        skipped = report.skipped.len(),
        conflicts = report.conflicts.len(),
        "two-level reconciliation finished"
    );
    report
}

/// Bring an equivalent native group's title in line with the bucket name.
async fn reuse_native(adapter: &dyn NativeGroupAdapter, existing: &NativeGroup, name: &str) {
    if existing.title == name {
        tracing::debug!(native_id = existing.id, bucket = %name, "reusing equivalent native group");
        return;
    }
    let patch = NativeGroupPatch {
        title: Some(name.to_string()),
        ..NativeGroupPatch::default()
    };
    match adapter.update_group(existing.id, &patch).await {
        Ok(_) => tracing::info!(native_id = existing.id, bucket = %name, "re-titled equivalent native group"),
        Err(e) => tracing::warn!(
            native_id = existing.id,
            bucket = %name,
            error = %e,
            "failed to re-title native group, keeping it"
        ),
    }
}

fn build_level1_group(
    native_id: NativeGroupId,
    bucket: IntentBucket,
    members: &[TabId],
    snapshot: &HashMap<TabId, TabInfo>,
    now: DateTime<Utc>,
) -> CustomGroup {
    let name = bucket.intent.intent_level1.clone();
    let mut group = CustomGroup::with_id(level1_record_id(native_id), &name, &name, now);
    group.description = bucket.intent.intent_level1_description.clone();
    for id in members {
        if let Some(info) = snapshot.get(id) {
            group.upsert_tab(info.clone());
        }
    }
    group.keywords = extract_keywords(group.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
    group.intent_analysis = Some(bucket.intent);
    group.prune_intent_analysis();
    group.set_confidence(confidence(group.tabs.len(), bucket.requested));
    group
}

/// Share of the classifier's requested ids that made it into the group.
fn confidence(live: usize, requested: usize) -> f64 {
    if requested == 0 {
        return 0.0;
    }
    live as f64 / requested as f64
}

// ─── Flat path ──────────────────────────────────────────────────────────────

/// Fold flat category assignments into the stored groups.
///
/// Each category becomes a candidate group. A candidate merges into a stored
/// (or earlier candidate) group of the same category when their keyword sets
/// are similar enough; otherwise it is added as a new group. Groups backed by
/// a native group are never merge targets.
pub fn reconcile_flat(
    assignments: &[CategoryAssignment],
    snapshot: &HashMap<TabId, TabInfo>,
    existing: &[CustomGroup],
    now: DateTime<Utc>,
) -> ReconcileReport {
    let live: HashSet<TabId> = snapshot.keys().copied().collect();
    let mut claims = Claims::default();
    let mut report = ReconcileReport::default();

    let mut pool: Vec<CustomGroup> = existing
        .iter()
        .filter(|g| !is_native_backed(g))
        .cloned()
        .collect();
    let mut touched: Vec<String> = Vec::new();

    for assignment in assignments {
        let category = assignment.id.trim();
        if category.is_empty() {
            report.skipped.push(SkippedBucket {
                name: String::new(),
                reason: SkipReason::MissingIntent,
            });
            continue;
        }
        let requested: HashSet<TabId> = assignment.tab_ids.iter().copied().collect();
        let ids = claims.claim(category, &assignment.tab_ids, &live);
        if ids.is_empty() {
            report.skipped.push(SkippedBucket {
                name: category.to_string(),
                reason: SkipReason::NoLiveTabs,
            });
            continue;
        }

        let mut candidate = CustomGroup::new(category, category, now);
        for id in &ids {
            if let Some(info) = snapshot.get(id) {
                candidate.upsert_tab(info.clone());
            }
        }
        candidate.keywords = extract_keywords(candidate.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
        candidate.set_confidence(confidence(ids.len(), requested.len()));

        match pool.iter_mut().find(|g| should_merge(g, &candidate)) {
            Some(target) => {
                tracing::info!(group_id = %target.id, category, "merging category into similar group");
                merge_groups(target, candidate, now);
                if !touched.contains(&target.id) {
                    touched.push(target.id.clone());
                }
            }
            None => {
                tracing::info!(group_id = %candidate.id, category, tab_count = ids.len(), "new category group");
                touched.push(candidate.id.clone());
                pool.push(candidate);
            }
        }
    }

    report.conflicts = claims.conflicts;
    report.groups = touched
        .iter()
        .filter_map(|id| pool.iter().find(|g| &g.id == id).cloned())
        .collect();
    report
}

/// Where a single new tab should go.
#[derive(Debug, Clone, PartialEq)]
pub enum TabAssignment {
    /// Join the stored group at this index.
    Existing { index: usize, score: f64 },
    /// No group scored high enough; start a new one.
    New(CustomGroup),
}

/// Assign one tab by the weighted similarity rule.
///
/// Only groups not backed by a native group are candidates, so native
/// membership stays the host's business.
pub fn assign_tab(
    tab: &TabInfo,
    groups: &[CustomGroup],
    now: DateTime<Utc>,
    use_content: bool,
) -> TabAssignment {
    let candidates: Vec<(usize, &CustomGroup)> = groups
        .iter()
        .enumerate()
        .filter(|(_, g)| !is_native_backed(g))
        .collect();
    let pool: Vec<CustomGroup> = candidates.iter().map(|(_, g)| (*g).clone()).collect();

    if let Some((pos, score)) = best_match(tab, &pool, now, use_content) {
        return TabAssignment::Existing {
            index: candidates[pos].0,
            score,
        };
    }

    let name = if tab.domain.is_empty() {
        tab.title().to_string()
    } else {
        tab.domain.clone()
    };
    let mut group = CustomGroup::new(&name, &name, now);
    group.upsert_tab(tab.clone());
    group.keywords = extract_keywords([tab.title()], MAX_KEYWORDS);
    group.set_confidence(1.0);
    TabAssignment::New(group)
}

fn is_native_backed(group: &CustomGroup) -> bool {
    crate::tabs::records::parse_native_group_id(&group.id).is_some()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
