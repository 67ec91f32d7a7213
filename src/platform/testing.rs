//! In-memory host and classifier fakes for tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ContentExtractor, NativeGroupAdapter, PlatformError, TabSource};
use crate::classifier::types::{ClassifierOutput, TabData};
use crate::classifier::{Classifier, ClassifierError};
use crate::tabs::{
    GroupQuery, NativeGroup, NativeGroupId, NativeGroupPatch, NativeGroupProps, Tab, TabId,
};

/// Build a plain tab in window 1.
pub fn tab(id: TabId, url: &str, title: &str) -> Tab {
    Tab {
        id,
        url: url.to_string(),
        title: title.to_string(),
        fav_icon_url: None,
        active: false,
        pinned: false,
        audible: false,
        group_id: None,
        window_id: 1,
    }
}

#[derive(Default)]
struct FakeState {
    tabs: BTreeMap<TabId, Tab>,
    groups: BTreeMap<NativeGroupId, NativeGroup>,
    next_group_id: NativeGroupId,
    content: HashMap<TabId, String>,
    content_delay: HashMap<TabId, Duration>,
    fail_create_containing: HashSet<TabId>,
    create_calls: usize,
}

impl FakeState {
    fn drop_empty_groups(&mut self) {
        let live: HashSet<NativeGroupId> = self.tabs.values().filter_map(|t| t.group_id).collect();
        self.groups.retain(|id, _| live.contains(id));
    }
}

/// A browser that keeps tabs and native groups in memory.
pub struct FakeBrowser {
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_group_id: 100,
                ..FakeState::default()
            }),
        }
    }

    pub fn with_tabs(tabs: Vec<Tab>) -> Self {
        let browser = Self::new();
        for t in tabs {
            browser.add_tab(t);
        }
        browser
    }

    pub fn add_tab(&self, tab: Tab) {
        self.state.lock().unwrap().tabs.insert(tab.id, tab);
    }

    /// Close a tab without notifying anyone, as a racing user would.
    pub fn close_tab(&self, tab_id: TabId) {
        let mut state = self.state.lock().unwrap();
        state.tabs.remove(&tab_id);
        state.drop_empty_groups();
    }

    pub fn set_content(&self, tab_id: TabId, text: &str) {
        self.state.lock().unwrap().content.insert(tab_id, text.to_string());
    }

    pub fn set_content_delay(&self, tab_id: TabId, delay: Duration) {
        self.state.lock().unwrap().content_delay.insert(tab_id, delay);
    }

    /// Make any `create_group` call that includes `tab_id` fail.
    pub fn fail_create_containing(&self, tab_id: TabId) {
        self.state.lock().unwrap().fail_create_containing.insert(tab_id);
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn native_groups(&self) -> Vec<NativeGroup> {
        self.state.lock().unwrap().groups.values().cloned().collect()
    }

    pub fn tab(&self, tab_id: TabId) -> Option<Tab> {
        self.state.lock().unwrap().tabs.get(&tab_id).cloned()
    }
}

#[async_trait]
impl TabSource for FakeBrowser {
    async fn query_tabs(&self) -> Result<Vec<Tab>, PlatformError> {
        Ok(self.state.lock().unwrap().tabs.values().cloned().collect())
    }
}

#[async_trait]
impl NativeGroupAdapter for FakeBrowser {
    async fn create_group(
        &self,
        tab_ids: &[TabId],
        props: &NativeGroupProps,
    ) -> Result<NativeGroupId, PlatformError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;

        for id in tab_ids {
            if !state.tabs.contains_key(id) {
                return Err(PlatformError::NoSuchTab { tab_id: *id });
            }
        }
        if tab_ids.iter().any(|id| state.fail_create_containing.contains(id)) {
            return Err(PlatformError::Host {
                reason: "grouping rejected".into(),
            });
        }
        let window_id = match tab_ids.first().and_then(|id| state.tabs.get(id)) {
            Some(t) => t.window_id,
            None => {
                return Err(PlatformError::Host {
                    reason: "no tabs to group".into(),
                })
            }
        };

        let group_id = state.next_group_id;
        state.next_group_id += 1;
        state.groups.insert(
            group_id,
            NativeGroup {
                id: group_id,
                title: props.title.clone(),
                color: props.color,
                collapsed: props.collapsed,
                window_id,
            },
        );
        for id in tab_ids {
            if let Some(t) = state.tabs.get_mut(id) {
                t.group_id = Some(group_id);
            }
        }
        state.drop_empty_groups();
        Ok(group_id)
    }

    async fn update_group(
        &self,
        group_id: NativeGroupId,
        patch: &NativeGroupPatch,
    ) -> Result<NativeGroup, PlatformError> {
        let mut state = self.state.lock().unwrap();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or(PlatformError::NoSuchGroup { group_id })?;
        if let Some(title) = &patch.title {
            group.title = title.clone();
        }
        if let Some(color) = patch.color {
            group.color = color;
        }
        if let Some(collapsed) = patch.collapsed {
            group.collapsed = collapsed;
        }
        Ok(group.clone())
    }

    async fn query_groups(&self, filter: &GroupQuery) -> Result<Vec<NativeGroup>, PlatformError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .values()
            .filter(|g| filter.matches(g))
            .cloned()
            .collect())
    }

    async fn get_tabs_in_group(&self, group_id: NativeGroupId) -> Result<Vec<Tab>, PlatformError> {
        let state = self.state.lock().unwrap();
        if !state.groups.contains_key(&group_id) {
            return Err(PlatformError::NoSuchGroup { group_id });
        }
        Ok(state
            .tabs
            .values()
            .filter(|t| t.group_id == Some(group_id))
            .cloned()
            .collect())
    }

    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        for id in tab_ids {
            match state.tabs.get_mut(id) {
                Some(t) => t.group_id = None,
                None => return Err(PlatformError::NoSuchTab { tab_id: *id }),
            }
        }
        state.drop_empty_groups();
        Ok(())
    }
}

#[async_trait]
impl ContentExtractor for FakeBrowser {
    async fn extract_text(&self, tab_id: TabId) -> Result<String, PlatformError> {
        let (delay, text) = {
            let state = self.state.lock().unwrap();
            (
                state.content_delay.get(&tab_id).copied(),
                state.content.get(&tab_id).cloned(),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        text.ok_or(PlatformError::Host {
            reason: format!("cannot script tab {tab_id}"),
        })
    }
}

/// A classifier that returns a canned response and records its inputs.
pub struct StaticClassifier {
    response: Mutex<Result<ClassifierOutput, ClassifierError>>,
    inputs: Mutex<Vec<Vec<TabData>>>,
    delay: Option<Duration>,
}

impl StaticClassifier {
    pub fn new(response: Result<ClassifierOutput, ClassifierError>) -> Self {
        Self {
            response: Mutex::new(response),
            inputs: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_response(&self, response: Result<ClassifierOutput, ClassifierError>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn last_input(&self) -> Option<Vec<TabData>> {
        self.inputs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, input: &[TabData]) -> Result<ClassifierOutput, ClassifierError> {
        self.inputs.lock().unwrap().push(input.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().unwrap().clone()
    }
}
