//! SQLite catalog for tidyvault.
//!
//! The catalog holds point-in-time snapshots of the files under a set of
//! roots, the cleanup actions planned against them and the files currently
//! held in quarantine. Aggregates used by the analyzers are evaluated in SQL
//! so that large snapshots never have to be loaded into memory.

mod actions;
mod convert;
pub mod error;
pub mod models;
mod queries;
mod snapshots;
mod sqlite;

pub use error::{Result, StoreError};
pub use models::{
    DirectoryTotal, ExtensionCount, FileFilter, HistogramBucket, ParetoPoint, SnapshotDelta,
    HISTOGRAM_BUCKETS,
};
pub use sqlite::SnapshotStore;
