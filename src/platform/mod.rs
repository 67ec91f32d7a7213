//! Platform — the host browser's tab and grouping primitives.
//!
//! The extension bridge implements these traits over the browser APIs; this
//! crate only consumes them. Every call is asynchronous and may fail with
//! [`PlatformError::NoSuchTab`] when a tab closed after the snapshot was taken.

pub mod errors;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

pub use errors::PlatformError;

use crate::tabs::{GroupQuery, NativeGroup, NativeGroupId, NativeGroupPatch, NativeGroupProps, Tab, TabId};

/// Reads the current set of open tabs.
#[async_trait]
pub trait TabSource: Send + Sync {
    /// All open tabs across all windows.
    async fn query_tabs(&self) -> Result<Vec<Tab>, PlatformError>;
}

/// Create, update, query and dissolve native tab groups.
#[async_trait]
pub trait NativeGroupAdapter: Send + Sync {
    /// Group `tab_ids` into a new native group and return its id.
    async fn create_group(
        &self,
        tab_ids: &[TabId],
        props: &NativeGroupProps,
    ) -> Result<NativeGroupId, PlatformError>;

    async fn update_group(
        &self,
        group_id: NativeGroupId,
        patch: &NativeGroupPatch,
    ) -> Result<NativeGroup, PlatformError>;

    async fn query_groups(&self, filter: &GroupQuery) -> Result<Vec<NativeGroup>, PlatformError>;

    async fn get_tabs_in_group(&self, group_id: NativeGroupId) -> Result<Vec<Tab>, PlatformError>;

    /// Remove the given tabs from whatever native group they belong to.
    async fn ungroup_tabs(&self, tab_ids: &[TabId]) -> Result<(), PlatformError>;
}

/// Scripted read of a page's visible text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract_text(&self, tab_id: TabId) -> Result<String, PlatformError>;
}
