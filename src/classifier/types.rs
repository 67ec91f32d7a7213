//! Wire and result types for the classification workflow.

use serde::{Deserialize, Serialize};

use crate::tabs::TabId;

// ─── Request Types ───────────────────────────────────────────────────────────

/// One tab as sent to the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabData {
    pub id: TabId,
    pub title: String,
    pub url: String,
}

/// Request body for a workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRequest<'a, P: Serialize> {
    pub workflow_id: &'a str,
    pub parameters: WorkflowParameters<P>,
}

/// The `parameters` object of a workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowParameters<P: Serialize> {
    pub input: P,
}

// ─── Result Types ────────────────────────────────────────────────────────────

/// Single-level assignment: category name → tab ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    /// The category name.
    pub id: String,
    #[serde(default)]
    pub tab_ids: Vec<TabId>,
}

/// A validated level-2 bucket within a level-1 intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSubcategory {
    #[serde(default)]
    pub intent_level2: String,
    #[serde(default)]
    pub tab_ids: Vec<TabId>,
}

/// A validated level-1 intent with its subcategory breakdown.
///
/// Also stored on a `CustomGroup` as its intent analysis, so field names keep
/// the classifier's snake_case spelling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentGroup {
    pub intent_level1: String,
    #[serde(default)]
    pub intent_level1_description: String,
    #[serde(default)]
    pub subcategories: Vec<IntentSubcategory>,
}

impl IntentGroup {
    /// Every tab id referenced by any subcategory, in first-seen order.
    pub fn referenced_tab_ids(&self) -> Vec<TabId> {
        let mut ids = Vec::new();
        for sub in &self.subcategories {
            for id in &sub.tab_ids {
                if !ids.contains(id) {
                    ids.push(*id);
                }
            }
        }
        ids
    }
}

/// A two-level entry exactly as the classifier returned it.
///
/// Nothing is required at this stage; the reconciler validates entries and
/// drops the ones it cannot use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawIntentEntry {
    #[serde(default)]
    pub intent_level1: Option<String>,
    #[serde(default)]
    pub intent_level1_description: Option<String>,
    #[serde(default)]
    pub subcategories: serde_json::Value,
}

/// Decoded classifier output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierOutput {
    /// Single-level `{id: category, tab_ids}` assignments.
    Flat(Vec<CategoryAssignment>),
    /// Two-level intent entries, not yet validated.
    Intent(Vec<RawIntentEntry>),
}

impl ClassifierOutput {
    pub fn is_empty(&self) -> bool {
        match self {
            ClassifierOutput::Flat(v) => v.is_empty(),
            ClassifierOutput::Intent(v) => v.is_empty(),
        }
    }
}

// ─── Chat Stream Types ───────────────────────────────────────────────────────

/// Status carried by each chat stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    InProgress,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

/// The `data:` payload of one chat stream event.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatEventData {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<ChatStatus>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A snapshot of the assistant reply after one stream event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatUpdate {
    /// Full reply text so far. Each update supersedes the previous one.
    pub content: String,
    pub status: ChatStatus,
}
