use std::path::PathBuf;

use thiserror::Error;

use tidyvault_store::StoreError;

/// Errors that abort a scan before or while it writes to the catalog.
///
/// Unreadable directories inside a root are not errors; they are reported
/// in [`ScanSummary::skipped_directories`](crate::ScanSummary).
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("A scan of {roots} is already running")]
    AlreadyScanning { roots: String },

    #[error("Invalid scan root {path}: {message}")]
    InvalidRoot { path: PathBuf, message: String },

    #[error("No scan roots given")]
    NoRoots,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScanError {
    pub(crate) fn invalid_root(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::InvalidRoot {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
