//! Soft-failure types produced while walking a directory tree.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Why a directory was skipped during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Permission was denied.
    PermissionDenied,
    /// The directory disappeared between discovery and reading.
    NotFound,
    /// Error reading the directory listing.
    ReadError,
    /// Error reading metadata of an entry.
    MetadataError,
    /// A followed link leads back to a directory already visited.
    SymlinkCycle,
}

impl SkipReason {
    /// Classify an I/O error.
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::ReadError,
        }
    }
}

/// Non-fatal record of a directory the walk could not enter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDirectory {
    /// Path that was skipped.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of failure.
    pub reason: SkipReason,
}

impl SkippedDirectory {
    /// Create a new skipped directory entry.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            reason,
        }
    }

    /// Create an entry from an I/O error.
    pub fn from_io(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("{}: {error}", path.display()),
            reason: SkipReason::from_io(error),
            path,
        }
    }

    /// Create a symlink cycle entry.
    pub fn cycle(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            message: format!("Symlink cycle: {}", path.display()),
            path,
            reason: SkipReason::SymlinkCycle,
        }
    }
}
