//! Grouping — turns classifier buckets into native groups and stored records.
//!
//! A run snapshots the open tabs, asks the classifier for buckets, and
//! reconciles them against what already exists: equivalent native groups are
//! reused instead of duplicated, each tab lands in at most one bucket, and a
//! failing bucket never stops its siblings.
//!
//! Submodules:
//! - `service`: end-to-end pipeline, lifecycle events, scheduling
//! - `reconciler`: two-level and flat bucket reconciliation
//! - `sync`: native group index, tolerant host calls, stored-list edits
//! - `similarity`: weighted tab scoring and keyword merging
//! - `coordinator`: single-flight guard with coalesced reruns
//! - `errors`: grouping error types

pub mod coordinator;
pub mod errors;
pub mod reconciler;
pub mod service;
pub mod similarity;
pub mod sync;

pub use coordinator::{ReconcileCoordinator, RunState, TriggerOutcome};
pub use errors::GroupingError;
pub use reconciler::{ReconcileReport, SkipReason, SkippedBucket, TabConflict};
pub use service::{EventOutcome, GroupingService, TabEvent};
