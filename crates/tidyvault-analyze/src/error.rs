use thiserror::Error;

use tidyvault_core::SnapshotId;
use tidyvault_store::StoreError;

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),

    #[error("Snapshot {0} is not finalized")]
    SnapshotNotFinalized(SnapshotId),

    #[error("Snapshots {base} and {current} cover different roots")]
    RootsMismatch { base: SnapshotId, current: SnapshotId },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

pub type Result<T> = std::result::Result<T, AnalyzeError>;
