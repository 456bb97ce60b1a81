//! Row types returned by the aggregate queries.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bytes and file count held directly in one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryTotal {
    pub path: PathBuf,
    pub bytes: u64,
    pub file_count: u64,
}

/// Aggregate for one extension. `None` groups files without an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionCount {
    pub extension: Option<String>,
    pub file_count: u64,
    pub total_bytes: u64,
}

/// One sample of the cumulative size distribution.
///
/// Files are ordered largest first; `files_pct` of the files hold
/// `bytes_pct` of the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    pub files_pct: f64,
    pub bytes_pct: f64,
}

/// Number of histogram buckets: zero bytes, fifteen decades, and the overflow.
pub const HISTOGRAM_BUCKETS: usize = 17;

/// A base-10 log-scale size bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub index: u8,
    /// Inclusive lower bound.
    pub lower_bytes: u64,
    /// Exclusive upper bound, `None` for the last bucket.
    pub upper_bytes: Option<u64>,
    pub file_count: u64,
    pub total_bytes: u64,
}

impl HistogramBucket {
    /// Empty bucket with the bounds for `index`.
    pub fn empty(index: u8) -> Self {
        let (lower_bytes, upper_bytes) = match index {
            0 => (0, Some(1)),
            i if (i as usize) < HISTOGRAM_BUCKETS - 1 => {
                (10u64.pow(i as u32 - 1), Some(10u64.pow(i as u32)))
            }
            i => (10u64.pow(i as u32 - 1), None),
        };
        Self {
            index,
            lower_bytes,
            upper_bytes,
            file_count: 0,
            total_bytes: 0,
        }
    }
}

/// Differences between two snapshots of the same roots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDelta {
    pub added_files: u64,
    pub added_bytes: u64,
    pub removed_files: u64,
    pub removed_bytes: u64,
    /// Paths present in both whose size or mtime differs.
    pub changed_files: u64,
    /// Net size change over the changed paths.
    pub changed_bytes: i64,
    /// Net size change of the whole snapshot.
    pub net_bytes: i64,
}

/// Selection criteria for [`files_matching`](crate::SnapshotStore::files_matching).
///
/// Every condition that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFilter {
    pub min_size: Option<u64>,
    pub modified_before: Option<DateTime<Utc>>,
}

impl FileFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    pub fn modified_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.modified_before = Some(cutoff);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_histogram_bounds() {
        assert_eq!(HistogramBucket::empty(0).upper_bytes, Some(1));
        let one = HistogramBucket::empty(1);
        assert_eq!((one.lower_bytes, one.upper_bytes), (1, Some(10)));
        let three = HistogramBucket::empty(3);
        assert_eq!((three.lower_bytes, three.upper_bytes), (100, Some(1000)));
        let last = HistogramBucket::empty(16);
        assert_eq!(last.lower_bytes, 10u64.pow(15));
        assert!(last.upper_bytes.is_none());
    }
}
