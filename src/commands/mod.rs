//! Commands exposed to the extension host.
//!
//! Each command takes the shared [`TabMind`](crate::TabMind) state and returns
//! a serializable value, or a `String` error suitable for a UI banner.

pub mod chat;
pub mod groups;
pub mod settings;

pub use chat::{check_classifier_health, send_chat_message, ClassifierStatus};
pub use groups::{
    analyze_tabs, cancel_analysis, dissolve_group, handle_tab_event, list_groups, AnalyzeResponse,
    DissolveResponse,
};
pub use settings::{get_settings, get_sync_status, update_settings, SyncStatus};
