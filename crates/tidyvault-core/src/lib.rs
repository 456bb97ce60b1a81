//! Core types and traits for tidyvault.
//!
//! This crate provides the fundamental data structures shared by the
//! catalog, scanner, analyzers and cleanup engine: snapshot and file
//! records, identifiers, content hashes, scan configuration,
//! and the cleanup action records persisted by the catalog.

mod action;
mod config;
mod error;
mod record;
mod snapshot;

pub use action::{
    ActionState, CleanupAction, CleanupMode, CleanupTarget, ExecutionReport, FailedPath,
    QuarantineEntry, RejectReason, RejectedPath, RestoreOutcome, RestoreResult, UndoReport,
};
pub use config::{ScanConfig, ScanConfigBuilder, DEFAULT_BATCH_SIZE};
pub use error::{SkipReason, SkippedDirectory};
pub use record::{ActionId, ContentHash, FileRecord, InodeInfo, RiskLevel, SnapshotId};
pub use snapshot::{roots_key, ScanOptions, Snapshot};
