use std::path::PathBuf;

use thiserror::Error;

use tidyvault_core::{ActionId, SnapshotId};
use tidyvault_analyze::AnalyzeError;
use tidyvault_scan::ScanError;
use tidyvault_store::StoreError;

/// Errors returned by the cleanup engine.
///
/// Per-file failures during execute and undo are not errors; they are
/// reported in the returned report and the batch continues.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Executing action {0} requires confirmation")]
    ConfirmationRequired(ActionId),

    #[error("Action {0} not found")]
    ActionNotFound(ActionId),

    #[error("Snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),

    #[error("Snapshot {0} is not finalized")]
    SnapshotNotFinalized(SnapshotId),

    #[error("Action {0} was already executed")]
    AlreadyExecuted(ActionId),

    #[error("Action {0} was already undone")]
    AlreadyUndone(ActionId),

    #[error("Action {0} has not been executed")]
    NotExecuted(ActionId),

    #[error("Action {0} removed files without quarantine and cannot be undone")]
    NotRecoverable(ActionId),

    #[error("Action {0} expired and its quarantined files were purged")]
    Expired(ActionId),

    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("Kept copy {0} is missing or no longer matches")]
    KeptCopyChanged(PathBuf),

    #[error("Quarantine directory {quarantine} overlaps root {root}")]
    QuarantineOverlapsRoot { quarantine: PathBuf, root: PathBuf },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Analysis(#[from] AnalyzeError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CleanupError>;
