//! Snapshot container and scan options.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::SnapshotId;

/// Traversal options recorded with each snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Follow symbolic links to directories and files.
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Include entries whose name starts with a dot.
    #[serde(default)]
    pub include_hidden: bool,
}

impl ScanOptions {
    /// Check if an entry name should be skipped as hidden.
    pub fn should_skip_hidden(&self, name: &str) -> bool {
        !self.include_hidden && name.starts_with('.')
    }
}

/// Point-in-time catalog of the files under a set of roots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Catalog identifier.
    pub id: SnapshotId,
    /// When the snapshot was created.
    pub created_at: DateTime<Utc>,
    /// Roots that were scanned.
    pub roots: Vec<PathBuf>,
    /// Traversal options in effect.
    pub options: ScanOptions,
    /// Number of file records.
    pub file_count: u64,
    /// Sum of all record sizes.
    pub total_bytes: u64,
    /// Set only by finalization; a complete snapshot is immutable.
    pub complete: bool,
}

impl Snapshot {
    /// Key identifying this snapshot's root set.
    pub fn roots_key(&self) -> String {
        roots_key(&self.roots)
    }

    /// Check if a path lies under one of the snapshot roots.
    pub fn covers(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }
}

/// Order-independent key for a set of roots.
///
/// Two root lists that differ only in order or repetition produce the same key.
pub fn roots_key(roots: &[PathBuf]) -> String {
    let mut parts: Vec<String> = roots
        .iter()
        .map(|r| r.to_string_lossy().trim_end_matches('/').to_string())
        .map(|r| if r.is_empty() { "/".to_string() } else { r })
        .collect();
    parts.sort();
    parts.dedup();
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roots_key_is_order_independent() {
        let a = roots_key(&[PathBuf::from("/b"), PathBuf::from("/a")]);
        let b = roots_key(&[PathBuf::from("/a/"), PathBuf::from("/b"), PathBuf::from("/a")]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_root_slash_survives() {
        assert_eq!(roots_key(&[PathBuf::from("/")]), "/");
    }

    #[test]
    fn test_should_skip_hidden() {
        let mut options = ScanOptions::default();
        assert!(options.should_skip_hidden(".cache"));
        assert!(!options.should_skip_hidden("src"));

        options.include_hidden = true;
        assert!(!options.should_skip_hidden(".cache"));
    }
}
