//! Grouping service: the analyze pipeline and lifecycle event handling.
//!
//! Pipeline for one analysis run:
//! snapshot → settings → eligibility → enrichment → classify → reconcile →
//! persist (upserts, tab claiming, history pruning) → last-sync stamp.
//!
//! A classifier failure aborts before any mutation. Everything after the
//! classifier is best-effort per bucket; store write failures are collected
//! and surfaced together once every independent write has been attempted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::coordinator::{ReconcileCoordinator, TriggerOutcome};
use super::errors::GroupingError;
use super::reconciler::{
    apply_intent_plan, assign_tab, plan_intent_buckets, reconcile_flat, validate_intent_entries,
    ReconcileReport, TabAssignment,
};
use super::sync::{
    claim_tabs, integrate, prune_stale_tabs, refresh_tab_in_groups, remove_groups_for_native,
    remove_tab_from_groups, ungroup_tolerant, NativeIndex,
};
use crate::classifier::{Classifier, ClassifierOutput, TabData};
use crate::platform::{ContentExtractor, NativeGroupAdapter, PlatformError, TabSource};
use crate::store::{GroupEdit, GroupStore, GroupingFrequency, Settings};
use crate::tabs::domain::{is_eligible_for_analysis, privacy_reduced_url};
use crate::tabs::enrich::{enrich_tabs, EXTRACTION_TIMEOUT};
use crate::tabs::keywords::{extract_keywords, MAX_KEYWORDS};
use crate::tabs::{
    CustomGroup, GroupQuery, IntegratedGroup, NativeGroupId, Tab, TabId, TabInfo,
};

/// How often the scheduler checks whether a timed analysis is due.
pub const SCHEDULE_TICK: Duration = Duration::from_secs(60);

// ─── Events ─────────────────────────────────────────────────────────────────

/// Host-fired lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TabEvent {
    Created { tab: Tab },
    Updated { tab: Tab },
    Moved { tab: Tab },
    Removed { tab_id: TabId },
    GroupRemoved { group_id: NativeGroupId },
}

/// What handling one event changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    pub store_changed: bool,
    /// Group a newly created tab was auto-assigned to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_group: Option<String>,
    /// Report of the analysis this event triggered, if it drove one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<ReconcileReport>,
}

// ─── Service ────────────────────────────────────────────────────────────────

/// Owns the collaborators and the in-flight guard.
pub struct GroupingService {
    tabs: Arc<dyn TabSource>,
    native: Arc<dyn NativeGroupAdapter>,
    extractor: Option<Arc<dyn ContentExtractor>>,
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn GroupStore>,
    coordinator: ReconcileCoordinator,
    extraction_timeout: Duration,
}

impl GroupingService {
    pub fn new(
        tabs: Arc<dyn TabSource>,
        native: Arc<dyn NativeGroupAdapter>,
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn GroupStore>,
    ) -> Self {
        Self {
            tabs,
            native,
            extractor: None,
            classifier,
            store,
            coordinator: ReconcileCoordinator::new(),
            extraction_timeout: EXTRACTION_TIMEOUT,
        }
    }

    /// Enable best-effort page content enrichment.
    pub fn with_content_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub fn has_content_extractor(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn coordinator(&self) -> &ReconcileCoordinator {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<dyn GroupStore> {
        &self.store
    }

    // ─── Analysis ────────────────────────────────────────────────────────

    /// Analyze and group the open tabs, coalescing with any active run.
    pub async fn analyze(
        &self,
        cancel: CancellationToken,
    ) -> TriggerOutcome<Result<ReconcileReport, GroupingError>> {
        self.coordinator
            .trigger(|| self.run_analysis(cancel.clone()))
            .await
    }

    async fn run_analysis(&self, cancel: CancellationToken) -> Result<ReconcileReport, GroupingError> {
        if cancel.is_cancelled() {
            return Err(GroupingError::Cancelled);
        }

        let now = Utc::now();
        let tabs = self.tabs.query_tabs().await.map_err(GroupingError::Platform)?;
        let settings = self.store.get_settings().await?;
        let stored = self.store.get_groups().await?;

        let mut eligible: Vec<TabInfo> = tabs
            .iter()
            .filter(|t| is_eligible_for_analysis(&t.url))
            .map(|t| TabInfo::from_tab(t.clone(), now))
            .collect();

        tracing::info!(
            total = tabs.len(),
            eligible = eligible.len(),
            privacy_mode = settings.privacy_mode,
            "=== ANALYZE TABS ==="
        );

        if !settings.privacy_mode {
            if let Some(extractor) = &self.extractor {
                enrich_tabs(&mut eligible, extractor.as_ref(), self.extraction_timeout).await;
            }
        }

        let input = classifier_input(&eligible, settings.privacy_mode);
        let output = if input.is_empty() {
            ClassifierOutput::Intent(Vec::new())
        } else {
            self.classifier.classify(&input).await.map_err(|e| {
                let err = GroupingError::from(e);
                tracing::warn!(error = %err, "classification failed, leaving groups untouched");
                err
            })?
        };

        let snapshot: HashMap<TabId, TabInfo> =
            eligible.into_iter().map(|t| (t.id(), t)).collect();

        let report = match output {
            ClassifierOutput::Intent(raw) => {
                let (valid, mut skipped) = validate_intent_entries(raw);
                let live: HashSet<TabId> = snapshot.keys().copied().collect();
                let mut plan = plan_intent_buckets(valid, &live);
                skipped.append(&mut plan.skipped);
                plan.skipped = skipped;

                let natives = if plan.buckets.is_empty() {
                    Vec::new()
                } else {
                    self.native
                        .query_groups(&GroupQuery::all())
                        .await
                        .map_err(GroupingError::Platform)?
                };
                let mut index = NativeIndex::from_snapshot(natives, &tabs);
                apply_intent_plan(self.native.as_ref(), plan, &snapshot, &mut index, &cancel, now)
                    .await
            }
            ClassifierOutput::Flat(assignments) => {
                let report = reconcile_flat(&assignments, &snapshot, &stored, now);
                tracing::info!(
                    groups = report.groups.len(),
                    skipped = report.skipped.len(),
                    conflicts = report.conflicts.len(),
                    "flat reconciliation finished"
                );
                report
            }
        };

        self.persist(&report, &stored, &settings, now).await?;
        Ok(report)
    }

    /// Write the run's groups, then clean up the rest of the stored list.
    async fn persist(
        &self,
        report: &ReconcileReport,
        stored: &[CustomGroup],
        settings: &Settings,
        now: DateTime<Utc>,
    ) -> Result<(), GroupingError> {
        let mut failures = Vec::new();
        // Only groups that actually landed may take tabs from other groups
        let mut winners = Vec::with_capacity(report.groups.len());

        for group in &report.groups {
            let mut group = group.clone();
            if let Some(previous) = stored.iter().find(|g| g.id == group.id) {
                group.created_at = previous.created_at.min(group.created_at);
            }
            match self.store.add_or_update_group(&group).await {
                Ok(()) => winners.push(group),
                Err(e) => {
                    tracing::warn!(group_id = %group.id, error = %e, "failed to store group");
                    failures.push(format!("{}: {e}", group.id));
                }
            }
        }

        let max_age = (settings.max_history_days > 0)
            .then(|| chrono::Duration::days(i64::from(settings.max_history_days)));
        let cleanup: GroupEdit = Box::new(move |groups| {
            let claimed = claim_tabs(groups, &winners, now);
            let pruned = max_age.map_or(false, |age| prune_stale_tabs(groups, age, now));
            claimed || pruned
        });
        if let Err(e) = self.store.modify_groups(cleanup).await {
            tracing::warn!(error = %e, "failed to clean up stored groups");
            failures.push(format!("cleanup: {e}"));
        }

        if !failures.is_empty() {
            return Err(GroupingError::StoreWriteFailed { failures });
        }

        if !report.cancelled {
            self.store
                .set_last_sync(now)
                .await
                .map_err(|e| GroupingError::StoreWriteFailed {
                    failures: vec![format!("last sync: {e}")],
                })?;
        }
        Ok(())
    }

    // ─── Scheduling ──────────────────────────────────────────────────────

    /// Run a timed analysis if the configured frequency says one is due.
    pub async fn run_if_due(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<ReconcileReport>, GroupingError> {
        let settings = self.store.get_settings().await?;
        let last_sync = self.store.last_sync().await?;
        if !settings.enable_auto_grouping
            || !is_due(settings.grouping_frequency, last_sync, Utc::now())
        {
            return Ok(None);
        }
        tracing::info!(frequency = ?settings.grouping_frequency, "scheduled analysis due");
        self.analyze(cancel).await.completed().transpose()
    }

    /// Check for due analyses every [`SCHEDULE_TICK`] until `shutdown` fires.
    pub async fn run_schedule(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(SCHEDULE_TICK);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_if_due(shutdown.child_token()).await {
                        tracing::warn!(error = %e, "scheduled analysis failed");
                    }
                }
            }
        }
        tracing::debug!("analysis scheduler stopped");
    }

    // ─── Views and actions ───────────────────────────────────────────────

    /// Unified list of native and stored groups.
    pub async fn list_groups(&self) -> Result<Vec<IntegratedGroup>, GroupingError> {
        let natives = self
            .native
            .query_groups(&GroupQuery::all())
            .await
            .map_err(GroupingError::Platform)?;

        let mut with_tabs = Vec::with_capacity(natives.len());
        for group in natives {
            match self.native.get_tabs_in_group(group.id).await {
                Ok(tabs) => with_tabs.push((group, tabs)),
                Err(e) if e.is_stale_reference() => {
                    tracing::debug!(native_id = group.id, "native group vanished while listing");
                }
                Err(e) => return Err(GroupingError::Platform(e)),
            }
        }

        let customs = self.store.get_groups().await?;
        Ok(integrate(with_tabs, customs, Utc::now()))
    }

    /// Ungroup a native group's tabs and forget its stored records.
    ///
    /// Returns how many tabs were ungrouped.
    pub async fn dissolve_group(&self, native_id: NativeGroupId) -> Result<usize, GroupingError> {
        let tabs = match self.native.get_tabs_in_group(native_id).await {
            Ok(tabs) => tabs,
            Err(PlatformError::NoSuchGroup { .. }) => Vec::new(),
            Err(e) => return Err(GroupingError::Platform(e)),
        };
        let ids: Vec<TabId> = tabs.iter().map(|t| t.id).collect();
        let ungrouped = ungroup_tolerant(self.native.as_ref(), &ids)
            .await
            .map_err(GroupingError::Platform)?;

        self.edit_groups(
            "dissolve group",
            Box::new(move |groups| remove_groups_for_native(groups, native_id)),
        )
        .await?;

        tracing::info!(native_id, tab_count = ungrouped.len(), "native group dissolved");
        Ok(ungrouped.len())
    }

    // ─── Lifecycle events ────────────────────────────────────────────────

    /// Apply one host event, triggering an analysis when the settings ask
    /// for grouping on every tab change.
    pub async fn handle_event(
        &self,
        event: TabEvent,
        cancel: CancellationToken,
    ) -> Result<EventOutcome, GroupingError> {
        let settings = self.store.get_settings().await?;
        let on_change = settings.enable_auto_grouping
            && settings.grouping_frequency == GroupingFrequency::OnTabChange;

        let mut outcome = EventOutcome::default();
        let reanalyze = match event {
            TabEvent::Created { tab } => {
                if on_change {
                    true
                } else {
                    outcome.assigned_group = self.assign_new_tab(tab, &settings).await?;
                    outcome.store_changed = outcome.assigned_group.is_some();
                    false
                }
            }
            TabEvent::Updated { tab } => {
                outcome.store_changed = self.on_tab_updated(tab).await?;
                on_change
            }
            TabEvent::Moved { tab } => {
                outcome.store_changed = self.on_tab_updated(tab).await?;
                false
            }
            TabEvent::Removed { tab_id } => {
                outcome.store_changed = self.on_tab_removed(tab_id).await?;
                false
            }
            TabEvent::GroupRemoved { group_id } => {
                outcome.store_changed = self.on_group_removed(group_id).await?;
                false
            }
        };

        if reanalyze {
            if let TriggerOutcome::Completed(result) = self.analyze(cancel).await {
                outcome.analysis = Some(result?);
            }
        }
        Ok(outcome)
    }

    /// Remove a closed tab from every stored group.
    pub async fn on_tab_removed(&self, tab_id: TabId) -> Result<bool, GroupingError> {
        let now = Utc::now();
        self.edit_groups(
            "tab removed",
            Box::new(move |groups| remove_tab_from_groups(groups, tab_id, now)),
        )
        .await
    }

    /// Refresh a navigated or retitled tab in the stored groups.
    pub async fn on_tab_updated(&self, tab: Tab) -> Result<bool, GroupingError> {
        let now = Utc::now();
        self.edit_groups(
            "tab updated",
            Box::new(move |groups| refresh_tab_in_groups(groups, &tab, now)),
        )
        .await
    }

    /// Drop stored records mirroring a removed native group.
    pub async fn on_group_removed(&self, native_id: NativeGroupId) -> Result<bool, GroupingError> {
        self.edit_groups(
            "group removed",
            Box::new(move |groups| remove_groups_for_native(groups, native_id)),
        )
        .await
    }

    /// Auto-group a newly created tab when enabled. Returns the group id.
    pub async fn on_tab_created(&self, tab: Tab) -> Result<Option<String>, GroupingError> {
        let settings = self.store.get_settings().await?;
        self.assign_new_tab(tab, &settings).await
    }

    async fn assign_new_tab(
        &self,
        tab: Tab,
        settings: &Settings,
    ) -> Result<Option<String>, GroupingError> {
        if !settings.enable_auto_grouping || !is_eligible_for_analysis(&tab.url) {
            return Ok(None);
        }

        let now = Utc::now();
        let use_content = !settings.privacy_mode;
        let mut infos = vec![TabInfo::from_tab(tab, now)];
        if use_content {
            if let Some(extractor) = &self.extractor {
                enrich_tabs(&mut infos, extractor.as_ref(), self.extraction_timeout).await;
            }
        }
        let Some(info) = infos.pop() else {
            return Ok(None);
        };

        let (tx, rx) = oneshot::channel();
        self.edit_groups(
            "tab created",
            Box::new(move |groups| {
                // A reused id may still be listed from a missed removal
                remove_tab_from_groups(groups, info.id(), now);
                let group_id = match assign_tab(&info, groups, now, use_content) {
                    TabAssignment::Existing { index, score } => {
                        let group = &mut groups[index];
                        group.upsert_tab(info);
                        group.keywords =
                            extract_keywords(group.tabs.iter().map(TabInfo::title), MAX_KEYWORDS);
                        group.updated_at = now;
                        tracing::info!(group_id = %group.id, score, "new tab joined existing group");
                        group.id.clone()
                    }
                    TabAssignment::New(group) => {
                        tracing::info!(group_id = %group.id, name = %group.name, "new tab started a group");
                        let id = group.id.clone();
                        groups.push(group);
                        id
                    }
                };
                let _ = tx.send(group_id);
                true
            }),
        )
        .await?;

        Ok(rx.await.ok())
    }

    async fn edit_groups(&self, context: &str, edit: GroupEdit) -> Result<bool, GroupingError> {
        self.store.modify_groups(edit).await.map_err(|e| {
            tracing::warn!(context, error = %e, "store write failed");
            GroupingError::StoreWriteFailed {
                failures: vec![format!("{context}: {e}")],
            }
        })
    }
}

/// Build the classifier input, reducing URLs to their origin in privacy mode.
fn classifier_input(tabs: &[TabInfo], privacy_mode: bool) -> Vec<TabData> {
    tabs.iter()
        .map(|t| TabData {
            id: t.id(),
            title: t.title().to_string(),
            url: if privacy_mode {
                privacy_reduced_url(t.url())
            } else {
                t.url().to_string()
            },
        })
        .collect()
}

/// Whether a timed analysis should run now.
pub fn is_due(
    frequency: GroupingFrequency,
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(interval) = frequency.interval() else {
        return false;
    };
    match last_sync {
        None => true,
        Some(last) => chrono::Duration::from_std(interval)
            .map(|period| now - last >= period)
            .unwrap_or(false),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::classifier::{CategoryAssignment, ClassifierError, RawIntentEntry};
    use crate::platform::testing::{tab, FakeBrowser, StaticClassifier};
    use crate::store::{SettingsPatch, SqliteGroupStore, StoreError};

    fn scenario_tabs() -> Vec<Tab> {
        vec![
            tab(1, "https://github.com/x", "x"),
            tab(2, "https://github.com/y", "y"),
            tab(3, "https://news.site/a", "a"),
            tab(4, "chrome://settings", "Settings"),
        ]
    }

    fn intent_output() -> ClassifierOutput {
        let value = serde_json::json!([
            {"intent_level1": "Development", "subcategories": [{"intent_level2": "Repos", "tab_ids": [1, 2]}]},
            {"intent_level1": "News", "subcategories": [{"intent_level2": "Articles", "tab_ids": [3]}]}
        ]);
        ClassifierOutput::Intent(
            value
                .as_array()
                .unwrap()
                .iter()
                .map(|v| serde_json::from_value::<RawIntentEntry>(v.clone()).unwrap())
                .collect(),
        )
    }

    struct Harness {
        browser: Arc<FakeBrowser>,
        classifier: Arc<StaticClassifier>,
        store: Arc<SqliteGroupStore>,
        service: GroupingService,
    }

    fn harness_with(classifier: StaticClassifier) -> Harness {
        let browser = Arc::new(FakeBrowser::with_tabs(scenario_tabs()));
        let classifier = Arc::new(classifier);
        let store = Arc::new(SqliteGroupStore::open(":memory:").unwrap());
        let service = GroupingService::new(
            browser.clone(),
            browser.clone(),
            classifier.clone(),
            store.clone(),
        )
        .with_content_extractor(browser.clone())
        .with_extraction_timeout(std::time::Duration::from_millis(200));
        Harness {
            browser,
            classifier,
            store,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(StaticClassifier::new(Ok(intent_output())))
    }

    async fn analyze(h: &Harness) -> Result<ReconcileReport, GroupingError> {
        h.service
            .analyze(CancellationToken::new())
            .await
            .completed()
            .expect("no other run is active")
    }

    #[tokio::test]
    async fn test_analyze_persists_groups_and_last_sync() {
        let h = harness();
        let report = analyze(&h).await.unwrap();

        assert_eq!(report.groups.len(), 2);
        assert_eq!(h.browser.native_groups().len(), 2);

        let stored = h.store.get_groups().await.unwrap();
        let names: Vec<&str> = stored.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Development", "News"]);
        assert!(h.store.last_sync().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_internal_pages_are_not_sent() {
        let h = harness();
        analyze(&h).await.unwrap();
        let input = h.classifier.last_input().unwrap();
        let ids: Vec<TabId> = input.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(input[0].url, "https://github.com/x");
    }

    #[tokio::test]
    async fn test_repeat_analysis_is_idempotent() {
        let h = harness();
        analyze(&h).await.unwrap();
        let calls = h.browser.create_calls();

        let second = analyze(&h).await.unwrap();
        assert_eq!(h.browser.create_calls(), calls);
        assert_eq!(second.reused_native, 2);
        assert_eq!(h.store.get_groups().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_classifier_failure_mutates_nothing() {
        let h = harness_with(StaticClassifier::new(Err(ClassifierError::Timeout {
            duration_secs: 30,
        })));
        let err = analyze(&h).await.unwrap_err();

        assert!(matches!(err, GroupingError::ClassifierUnavailable { .. }));
        assert!(h.browser.native_groups().is_empty());
        assert!(h.store.get_groups().await.unwrap().is_empty());
        assert!(h.store.last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_output_is_reported() {
        let h = harness_with(StaticClassifier::new(Err(ClassifierError::Malformed {
            reason: "output is not JSON".into(),
        })));
        let err = analyze(&h).await.unwrap_err();
        assert!(matches!(err, GroupingError::ClassifierMalformed { .. }));
        assert_eq!(h.browser.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_privacy_mode_reduces_urls_and_skips_content() {
        let h = harness();
        h.browser.set_content(1, "private page text");
        h.store
            .update_settings(&SettingsPatch {
                privacy_mode: Some(true),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();

        analyze(&h).await.unwrap();
        let input = h.classifier.last_input().unwrap();
        assert_eq!(input[0].url, "https://github.com/");

        let stored = h.store.get_groups().await.unwrap();
        assert!(stored.iter().flat_map(|g| &g.tabs).all(|t| t.content.is_none()));
    }

    #[tokio::test]
    async fn test_content_is_enriched_outside_privacy_mode() {
        let h = harness();
        h.browser.set_content(1, "repository readme");
        analyze(&h).await.unwrap();

        let stored = h.store.get_groups().await.unwrap();
        let tab1 = stored
            .iter()
            .flat_map(|g| &g.tabs)
            .find(|t| t.id() == 1)
            .unwrap();
        assert_eq!(tab1.content.as_deref(), Some("repository readme"));
    }

    #[tokio::test]
    async fn test_flat_output_is_store_only() {
        let h = harness_with(StaticClassifier::new(Ok(ClassifierOutput::Flat(vec![
            CategoryAssignment {
                id: "Code".into(),
                tab_ids: vec![1, 2],
            },
        ]))));
        let report = analyze(&h).await.unwrap();

        assert_eq!(report.groups.len(), 1);
        assert_eq!(h.browser.create_calls(), 0);
        let stored = h.store.get_groups().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].category, "Code");
    }

    #[tokio::test]
    async fn test_concurrent_analyses_coalesce() {
        let h = harness_with(
            StaticClassifier::new(Ok(intent_output()))
                .with_delay(std::time::Duration::from_millis(100)),
        );

        let (a, b) = tokio::join!(
            h.service.analyze(CancellationToken::new()),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                h.service.analyze(CancellationToken::new()).await
            }
        );

        assert!(matches!(a, TriggerOutcome::Completed(Ok(_))));
        assert!(matches!(b, TriggerOutcome::Coalesced));
        // The coalesced trigger ran once more after the first pass
        assert_eq!(h.classifier.calls(), 2);
        assert_eq!(h.browser.native_groups().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let h = harness();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = h.service.analyze(cancel).await;
        assert_eq!(
            outcome.completed(),
            Some(Err(GroupingError::Cancelled))
        );
        assert_eq!(h.classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_history_pruning_and_tab_claiming() {
        let h = harness();
        let now = Utc::now();

        let mut old = CustomGroup::with_id("old".into(), "Old", "Old", now);
        let mut stale = TabInfo::from_tab(tab(9, "https://old.example", "old"), now);
        stale.last_accessed = now - ChronoDuration::days(45);
        old.upsert_tab(stale);

        let mut overlapping = CustomGroup::with_id("mine".into(), "Mine", "Mine", now);
        overlapping.upsert_tab(TabInfo::from_tab(tab(1, "https://github.com/x", "x"), now));
        overlapping.upsert_tab(TabInfo::from_tab(tab(8, "https://keep.example", "keep"), now));

        h.store.save_groups(&[old, overlapping]).await.unwrap();
        analyze(&h).await.unwrap();

        let stored = h.store.get_groups().await.unwrap();
        assert!(stored.iter().all(|g| g.id != "old"));
        let mine = stored.iter().find(|g| g.id == "mine").unwrap();
        assert_eq!(mine.sorted_tab_ids(), vec![8]);
    }

    #[tokio::test]
    async fn test_list_groups_integrates_native_and_custom() {
        let h = harness();
        analyze(&h).await.unwrap();
        let mut extra = CustomGroup::with_id("manual".into(), "Reading", "Reading", Utc::now());
        extra.upsert_tab(TabInfo::from_tab(tab(3, "https://news.site/a", "a"), Utc::now()));
        extra.upsert_tab(TabInfo::from_tab(tab(5, "https://blog.example", "b"), Utc::now()));
        h.store.add_or_update_group(&extra).await.unwrap();

        let view = h.service.list_groups().await.unwrap();
        let names: Vec<&str> = view.iter().map(|g| g.group.name.as_str()).collect();
        assert_eq!(names, vec!["Development", "News", "Reading"]);
        assert!(view[0].is_native_group && view[1].is_native_group);
        assert!(!view[2].is_native_group);
    }

    #[tokio::test]
    async fn test_dissolve_group() {
        let h = harness();
        analyze(&h).await.unwrap();
        let dev = h.browser.native_groups()[0].id;

        let count = h.service.dissolve_group(dev).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(h.browser.tab(1).unwrap().group_id, None);
        let stored = h.store.get_groups().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "News");

        // Dissolving again is a no-op
        assert_eq!(h.service.dissolve_group(dev).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_events_keep_store_in_sync() {
        let h = harness();
        analyze(&h).await.unwrap();
        let cancel = CancellationToken::new();

        let mut renamed = tab(3, "https://news.site/b", "Budget vote");
        renamed.group_id = h.browser.tab(3).unwrap().group_id;
        let outcome = h
            .service
            .handle_event(TabEvent::Updated { tab: renamed }, cancel.clone())
            .await
            .unwrap();
        assert!(outcome.store_changed);
        assert!(outcome.analysis.is_none());
        let stored = h.store.get_groups().await.unwrap();
        let news = stored.iter().find(|g| g.name == "News").unwrap();
        assert_eq!(news.tabs[0].title(), "Budget vote");

        let outcome = h
            .service
            .handle_event(TabEvent::Removed { tab_id: 3 }, cancel.clone())
            .await
            .unwrap();
        assert!(outcome.store_changed);
        let stored = h.store.get_groups().await.unwrap();
        assert_eq!(stored.len(), 1, "emptied News group is dropped");

        let dev = h.browser.native_groups()[0].id;
        let outcome = h
            .service
            .handle_event(TabEvent::GroupRemoved { group_id: dev }, cancel)
            .await
            .unwrap();
        assert!(outcome.store_changed);
        assert!(h.store.get_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_created_tab_is_auto_assigned() {
        let h = harness();
        let now = Utc::now();
        let mut code = CustomGroup::with_id("code".into(), "Code", "Code", now);
        code.upsert_tab(TabInfo::from_tab(tab(1, "https://github.com/x", "x"), now));
        h.store.save_groups(&[code]).await.unwrap();

        let joined = h
            .service
            .on_tab_created(tab(10, "https://github.com/z", "z"))
            .await
            .unwrap();
        assert_eq!(joined.as_deref(), Some("code"));

        let fresh = h
            .service
            .on_tab_created(tab(11, "https://cooking.example/pasta", "Pasta"))
            .await
            .unwrap()
            .unwrap();
        assert_ne!(fresh, "code");

        let internal = h
            .service
            .on_tab_created(tab(12, "chrome://newtab", "New Tab"))
            .await
            .unwrap();
        assert!(internal.is_none());

        let stored = h.store.get_groups().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].sorted_tab_ids(), vec![1, 10]);
    }

    #[tokio::test]
    async fn test_auto_grouping_disabled() {
        let h = harness();
        h.store
            .update_settings(&SettingsPatch {
                enable_auto_grouping: Some(false),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        let assigned = h
            .service
            .on_tab_created(tab(10, "https://github.com/z", "z"))
            .await
            .unwrap();
        assert!(assigned.is_none());
        assert!(h.store.get_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_tab_change_frequency_triggers_analysis() {
        let h = harness();
        h.store
            .update_settings(&SettingsPatch {
                grouping_frequency: Some(GroupingFrequency::OnTabChange),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();

        let outcome = h
            .service
            .handle_event(
                TabEvent::Created {
                    tab: tab(3, "https://news.site/a", "a"),
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let report = outcome.analysis.unwrap();
        assert_eq!(report.groups.len(), 2);
        assert_eq!(h.classifier.calls(), 1);
    }

    #[test]
    fn test_is_due() {
        let now = Utc::now();
        assert!(!is_due(GroupingFrequency::Manual, None, now));
        assert!(is_due(GroupingFrequency::Hourly, None, now));
        assert!(!is_due(
            GroupingFrequency::Hourly,
            Some(now - ChronoDuration::minutes(30)),
            now
        ));
        assert!(is_due(
            GroupingFrequency::Hourly,
            Some(now - ChronoDuration::minutes(61)),
            now
        ));
        assert!(!is_due(
            GroupingFrequency::Daily,
            Some(now - ChronoDuration::hours(5)),
            now
        ));
    }

    #[tokio::test]
    async fn test_run_if_due_respects_frequency() {
        let h = harness();
        assert!(h
            .service
            .run_if_due(CancellationToken::new())
            .await
            .unwrap()
            .is_none());

        h.store
            .update_settings(&SettingsPatch {
                grouping_frequency: Some(GroupingFrequency::Hourly),
                ..SettingsPatch::default()
            })
            .await
            .unwrap();
        let report = h.service.run_if_due(CancellationToken::new()).await.unwrap();
        assert!(report.is_some());

        // Just synced, so the next check is a no-op
        assert!(h
            .service
            .run_if_due(CancellationToken::new())
            .await
            .unwrap()
            .is_none());
        assert_eq!(h.classifier.calls(), 1);
    }

    /// Store whose group upserts fail for chosen ids.
    struct FlakyStore {
        inner: SqliteGroupStore,
        fail_ids: Vec<String>,
    }

    #[async_trait]
    impl GroupStore for FlakyStore {
        async fn get_groups(&self) -> Result<Vec<CustomGroup>, StoreError> {
            self.inner.get_groups().await
        }
        async fn save_groups(&self, groups: &[CustomGroup]) -> Result<(), StoreError> {
            self.inner.save_groups(groups).await
        }
        async fn add_or_update_group(&self, group: &CustomGroup) -> Result<(), StoreError> {
            if self.fail_ids.iter().any(|id| group.id.starts_with(id.as_str())) {
                return Err(StoreError::DatabaseError {
                    reason: "disk I/O error".into(),
                });
            }
            self.inner.add_or_update_group(group).await
        }
        async fn remove_group(&self, group_id: &str) -> Result<bool, StoreError> {
            self.inner.remove_group(group_id).await
        }
        async fn modify_groups(&self, edit: GroupEdit) -> Result<bool, StoreError> {
            self.inner.modify_groups(edit).await
        }
        async fn get_settings(&self) -> Result<Settings, StoreError> {
            self.inner.get_settings().await
        }
        async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError> {
            self.inner.update_settings(patch).await
        }
        async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
            self.inner.last_sync().await
        }
        async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.inner.set_last_sync(at).await
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_aggregated_after_all_writes() {
        let browser = Arc::new(FakeBrowser::with_tabs(scenario_tabs()));
        let store = Arc::new(FlakyStore {
            inner: SqliteGroupStore::open(":memory:").unwrap(),
            fail_ids: vec!["level1-100".into()],
        });
        let service = GroupingService::new(
            browser.clone(),
            browser.clone(),
            Arc::new(StaticClassifier::new(Ok(intent_output()))),
            store.clone(),
        );

        let err = service
            .analyze(CancellationToken::new())
            .await
            .completed()
            .unwrap()
            .unwrap_err();
        match err {
            GroupingError::StoreWriteFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("level1-100"));
            }
            other => panic!("expected aggregate store failure, got {other:?}"),
        }

        // The sibling write still landed; no sync stamp on failure
        let stored = store.get_groups().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].name, "News");
        assert!(store.last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_take_tabs_from_existing_groups() {
        let browser = Arc::new(FakeBrowser::with_tabs(scenario_tabs()));
        let store = Arc::new(FlakyStore {
            inner: SqliteGroupStore::open(":memory:").unwrap(),
            fail_ids: vec!["level1-100".into()],
        });
        let now = Utc::now();
        let mut mine = CustomGroup::with_id("mine".into(), "Mine", "Mine", now);
        mine.upsert_tab(TabInfo::from_tab(tab(1, "https://github.com/x", "x"), now));
        store.save_groups(&[mine]).await.unwrap();

        let service = GroupingService::new(
            browser.clone(),
            browser.clone(),
            Arc::new(StaticClassifier::new(Ok(intent_output()))),
            store.clone(),
        );
        let result = service.analyze(CancellationToken::new()).await.completed().unwrap();
        assert!(matches!(result, Err(GroupingError::StoreWriteFailed { .. })));

        // Development (tabs 1, 2) was never stored, so "mine" keeps tab 1
        let stored = store.get_groups().await.unwrap();
        let holders: Vec<&str> = stored
            .iter()
            .filter(|g| g.contains_tab(1))
            .map(|g| g.id.as_str())
            .collect();
        assert_eq!(holders, vec!["mine"]);
        assert!(stored.iter().any(|g| g.name == "News"));
    }
}
