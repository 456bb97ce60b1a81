//! File record and identifier types.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identifier of a snapshot in the catalog. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub i64);

impl SnapshotId {
    /// Create a new SnapshotId from a raw row id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a cleanup action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub i64);

impl ActionId {
    /// Create a new ActionId from a raw row id.
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLAKE3 content hash for duplicate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Inode information, used to detect directory cycles and hard links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    /// Create new inode info.
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }

    /// Identity of the file or directory behind `metadata`.
    #[cfg(unix)]
    pub fn of(metadata: &std::fs::Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self::new(metadata.ino(), metadata.dev()))
    }

    #[cfg(not(unix))]
    pub fn of(_metadata: &std::fs::Metadata) -> Option<Self> {
        None
    }
}

/// Safety tier of a deletion candidate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RiskLevel {
    /// Safe to clean automatically.
    Low,
    /// Needs a human glance.
    Medium,
    /// Never cleaned unless explicitly forced.
    High,
}

/// A single cataloged file within a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Snapshot this record belongs to.
    pub snapshot_id: SnapshotId,
    /// Canonical absolute path.
    pub path: PathBuf,
    /// Apparent size in bytes.
    pub size_bytes: u64,
    /// Last modification time.
    pub mtime: DateTime<Utc>,
    /// Lowercased extension without the leading dot.
    pub extension: Option<CompactString>,
}

impl FileRecord {
    /// Create a record, deriving the extension from the path.
    pub fn new(
        snapshot_id: SnapshotId,
        path: impl Into<PathBuf>,
        size_bytes: u64,
        mtime: DateTime<Utc>,
    ) -> Self {
        let path = path.into();
        let extension = extension_of(&path);
        Self {
            snapshot_id,
            path,
            size_bytes,
            mtime,
            extension,
        }
    }

    /// Directory containing this file.
    pub fn parent_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new(""))
    }

    /// File name component as a lossy string.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Lowercased extension of a path, if any.
pub(crate) fn extension_of(path: &Path) -> Option<CompactString> {
    path.extension()
        .map(|e| CompactString::new(e.to_string_lossy().to_lowercase()))
        .filter(|e| !e.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_hex().starts_with("abab"));
    }

    #[test]
    fn test_extension_is_lowercased() {
        let record = FileRecord::new(SnapshotId::new(1), "/data/Photo.JPG", 10, Utc::now());
        assert_eq!(record.extension.as_deref(), Some("jpg"));
        assert_eq!(record.parent_dir(), Path::new("/data"));
        assert_eq!(record.file_name(), "Photo.JPG");
    }

    #[test]
    fn test_no_extension() {
        let record = FileRecord::new(SnapshotId::new(1), "/data/Makefile", 10, Utc::now());
        assert!(record.extension.is_none());
    }

    #[test]
    fn test_risk_level_ordering_and_names() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert_eq!(RiskLevel::High.to_string(), "high");
        assert_eq!("low".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
    }
}
