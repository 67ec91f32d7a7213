//! Group Store — durable persistence for custom groups and settings.
//!
//! The layout is three top-level keys: the custom group array, the settings
//! object, and the last-sync timestamp. Writes to the group array are
//! serialized by the store, so two near-simultaneous upserts to the same id
//! both land (last write wins on conflicting fields).
//!
//! Submodules:
//! - `sqlite`: SQLite key-value implementation
//! - `settings`: Settings model and partial updates
//! - `errors`: store error types

pub mod errors;
pub mod settings;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use errors::StoreError;
pub use settings::{GroupingFrequency, Settings, SettingsPatch};
pub use sqlite::SqliteGroupStore;

use crate::tabs::CustomGroup;

/// Key holding the custom group array.
pub const GROUPS_KEY: &str = "customGroups";

/// Key holding the settings object.
pub const SETTINGS_KEY: &str = "settings";

/// Key holding the RFC 3339 timestamp of the last completed analysis.
pub const LAST_SYNC_KEY: &str = "lastSync";

/// In-place edit of the stored group list. Returns whether anything changed.
pub type GroupEdit = Box<dyn FnOnce(&mut Vec<CustomGroup>) -> bool + Send>;

/// Durable key-value persistence for groups and settings.
#[async_trait]
pub trait GroupStore: Send + Sync {
    async fn get_groups(&self) -> Result<Vec<CustomGroup>, StoreError>;

    /// Replace the whole group list atomically.
    async fn save_groups(&self, groups: &[CustomGroup]) -> Result<(), StoreError>;

    /// Insert or replace a group by id.
    async fn add_or_update_group(&self, group: &CustomGroup) -> Result<(), StoreError>;

    /// Remove a group by id. Returns whether it existed.
    async fn remove_group(&self, group_id: &str) -> Result<bool, StoreError>;

    /// Apply `edit` to the group list as one atomic read-modify-write.
    async fn modify_groups(&self, edit: GroupEdit) -> Result<bool, StoreError>;

    async fn get_settings(&self) -> Result<Settings, StoreError>;

    /// Merge `patch` into the stored settings and return the result.
    async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, StoreError>;

    async fn last_sync(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<(), StoreError>;
}
