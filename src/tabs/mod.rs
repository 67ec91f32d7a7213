//! Tabs — the data model for tabs, native groups, and custom groups.
//!
//! Submodules:
//! - `types`: Tab, TabInfo, NativeGroup, CustomGroup, IntegratedGroup
//! - `records`: `GroupRecord` union and native/custom conversions
//! - `domain`: URL-derived helpers (domain, eligibility, privacy reduction)
//! - `keywords`: title keyword extraction
//! - `enrich`: best-effort page content extraction

pub mod domain;
pub mod enrich;
pub mod keywords;
pub mod records;
pub mod types;

pub use records::GroupRecord;
pub use types::{
    CustomGroup, GroupColor, GroupQuery, IntegratedGroup, NativeGroup, NativeGroupId,
    NativeGroupPatch, NativeGroupProps, Tab, TabId, TabInfo, WindowId,
};
