//! Similarity scoring for the flat (single-level) grouping path.
//!
//! Tab → group scoring is a weighted sum of four signals:
//!
//! | Signal                         | Weight |
//! |--------------------------------|--------|
//! | same domain as any member      | 0.4    |
//! | title contains a group keyword | 0.3    |
//! | content contains a keyword     | 0.2    |
//! | recency of the group's update  | ≤ 0.1  |
//!
//! Group → group merging uses the Jaccard index of the keyword sets.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::tabs::keywords::{extract_keywords, MAX_KEYWORDS};
use crate::tabs::{CustomGroup, TabInfo};

pub const DOMAIN_WEIGHT: f64 = 0.4;
pub const TITLE_KEYWORD_WEIGHT: f64 = 0.3;
pub const CONTENT_KEYWORD_WEIGHT: f64 = 0.2;
pub const RECENCY_WEIGHT: f64 = 0.1;

/// Recency bonus decays to zero over this many hours.
pub const RECENCY_WINDOW_HOURS: f64 = 24.0;

/// Scores are compared at 1e-9 resolution.
const SCORE_SCALE: f64 = 1e9;

/// A tab joins an existing group only when its score exceeds this.
pub const ASSIGN_THRESHOLD: f64 = 0.3;

/// Two groups merge only when keyword Jaccard exceeds this.
pub const MERGE_JACCARD_THRESHOLD: f64 = 0.7;

// ─── Tab → group ────────────────────────────────────────────────────────────

/// `0.1 * max(0, 1 - hours_since_update / 24)`.
///
/// A timestamp in the future counts as "just now".
pub fn recency_bonus(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = (now - updated_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
    RECENCY_WEIGHT * (1.0 - hours / RECENCY_WINDOW_HOURS).max(0.0)
}

/// Score how well `tab` fits `group`, in `[0, 1]`.
///
/// `use_content` is false in privacy mode; extracted text then never
/// contributes.
pub fn tab_group_score(
    tab: &TabInfo,
    group: &CustomGroup,
    now: DateTime<Utc>,
    use_content: bool,
) -> f64 {
    let mut score = 0.0;

    if !tab.domain.is_empty() && group.tabs.iter().any(|t| t.domain == tab.domain) {
        score += DOMAIN_WEIGHT;
    }

    let keywords: Vec<String> = group
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();

    if contains_any(&tab.title().to_lowercase(), &keywords) {
        score += TITLE_KEYWORD_WEIGHT;
    }

    if use_content {
        if let Some(content) = tab.content.as_deref() {
            if contains_any(&content.to_lowercase(), &keywords) {
                score += CONTENT_KEYWORD_WEIGHT;
            }
        }
    }

    score += recency_bonus(group.updated_at, now);
    round_score(score).clamp(0.0, 1.0)
}

/// Snap accumulated float error (0.2 + 0.1 = 0.30000000000000004) so the
/// strict threshold comparison and the upper clamp see exact sums.
fn round_score(score: f64) -> f64 {
    (score * SCORE_SCALE).round() / SCORE_SCALE
}

fn contains_any(haystack: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

/// Highest-scoring group for `tab`, if its score exceeds [`ASSIGN_THRESHOLD`].
///
/// Ties go to the earlier group.
pub fn best_match(
    tab: &TabInfo,
    groups: &[CustomGroup],
    now: DateTime<Utc>,
    use_content: bool,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, group) in groups.iter().enumerate() {
        let score = tab_group_score(tab, group, now, use_content);
        if score <= ASSIGN_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best
}

// ─── Group → group ──────────────────────────────────────────────────────────

/// Jaccard index of two keyword sets (case-insensitive). Two empty sets score 0.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<String> = a.iter().map(|k| k.to_lowercase()).collect();
    let b: HashSet<String> = b.iter().map(|k| k.to_lowercase()).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Whether two groups describe the same bucket closely enough to merge.
pub fn should_merge(a: &CustomGroup, b: &CustomGroup) -> bool {
    a.category == b.category && jaccard(&a.keywords, &b.keywords) > MERGE_JACCARD_THRESHOLD
}

/// Fold `other` into `target`, keeping `target`'s identity.
pub fn merge_groups(target: &mut CustomGroup, other: CustomGroup, now: DateTime<Utc>) {
    let mut tabs = std::mem::take(&mut target.tabs);
    tabs.extend(other.tabs);
    target.tabs = dedupe_by_url(tabs);

    target.keywords = extract_keywords(target.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
    if target.description.is_empty() {
        target.description = other.description;
    }
    target.created_at = target.created_at.min(other.created_at);
    target.updated_at = now;
    target.set_confidence(target.confidence.max(other.confidence));
    target.prune_intent_analysis();
}

/// Deduplicate tabs by URL, then by id, keeping the copy with the later
/// `last_accessed`. Surviving entries keep their first-seen position.
pub fn dedupe_by_url(tabs: Vec<TabInfo>) -> Vec<TabInfo> {
    let mut out: Vec<TabInfo> = Vec::with_capacity(tabs.len());
    for tab in tabs {
        match out
            .iter_mut()
            .find(|t| t.url() == tab.url() || t.id() == tab.id())
        {
            Some(existing) => {
                if tab.last_accessed > existing.last_accessed {
                    *existing = tab;
                }
            }
            None => out.push(tab),
        }
    }
    out
}

// ─── Tests ──────────────────────────────────────────────────────────────────
