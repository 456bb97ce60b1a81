use thiserror::Error;

use tidyvault_core::{ActionId, SnapshotId};

/// Errors surfaced by the catalog. All of them abort the calling operation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Catalog connection lock poisoned")]
    LockPoisoned,

    #[error("Snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),

    #[error("Snapshot {0} is finalized and can no longer be written")]
    SnapshotFinalized(SnapshotId),

    #[error("Action {0} not found")]
    ActionNotFound(ActionId),

    #[error("Invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
