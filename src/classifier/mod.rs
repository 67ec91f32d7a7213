//! Classifier — client for the remote AI workflow that buckets tabs.
//!
//! This module handles all communication with the workflow endpoint:
//! - Classification runs (`{workflow_id, parameters: {input}}`)
//! - Decoding the double-encoded `output` into flat or two-level results
//! - SSE chat streaming with cumulative content
//! - Endpoint configuration loading from `tabmind.yaml`
//!
//! The classifier itself is opaque; the rest of the crate depends only on the
//! [`Classifier`] trait and the typed [`ClassifierOutput`].

pub mod client;
pub mod config;
pub mod decode;
pub mod errors;
pub mod streaming;
pub mod types;

use async_trait::async_trait;

// Re-exports for convenience
pub use client::WorkflowClient;
pub use config::WorkflowConfig;
pub use errors::ClassifierError;
pub use streaming::collect_chat_reply;
pub use types::{
    CategoryAssignment, ChatStatus, ChatUpdate, ClassifierOutput, IntentGroup, IntentSubcategory,
    RawIntentEntry, TabData,
};

/// Maps a batch of tabs to category or intent buckets.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, input: &[TabData]) -> Result<ClassifierOutput, ClassifierError>;
}
