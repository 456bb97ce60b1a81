//! Read-only disk usage aggregates over a snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use tidyvault_core::{FileRecord, Snapshot, SnapshotId};
use tidyvault_store::{ExtensionCount, HistogramBucket, ParetoPoint, SnapshotDelta, SnapshotStore};

use crate::error::{AnalyzeError, Result};

/// Coarse file type, derived from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileCategory {
    Image,
    Video,
    Audio,
    Document,
    Archive,
    Code,
    Other,
}

impl FileCategory {
    /// Category of a lowercase extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "heic" | "heif" | "tif" | "tiff"
            | "svg" | "raw" | "cr2" | "nef" | "dng" | "ico" => Self::Image,
            "mp4" | "mkv" | "mov" | "avi" | "webm" | "m4v" | "wmv" | "flv" | "3gp" | "mpg"
            | "mpeg" => Self::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "opus" | "wma" | "aiff" => Self::Audio,
            "pdf" | "doc" | "docx" | "xls" | "xlsx" | "ppt" | "pptx" | "odt" | "ods" | "odp"
            | "txt" | "md" | "rtf" | "csv" | "epub" => Self::Document,
            "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "zst" | "7z" | "rar" | "iso" | "dmg"
            | "apk" | "deb" | "rpm" => Self::Archive,
            "rs" | "py" | "js" | "ts" | "tsx" | "jsx" | "c" | "h" | "cpp" | "hpp" | "cc" | "go"
            | "java" | "kt" | "swift" | "rb" | "php" | "cs" | "sh" | "html" | "css" | "json"
            | "toml" | "yaml" | "yml" | "xml" | "sql" => Self::Code,
            _ => Self::Other,
        }
    }
}

/// Bytes under one directory, including all subdirectories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderUsage {
    pub path: PathBuf,
    pub bytes: u64,
    pub file_count: u64,
}

/// Totals for one [`FileCategory`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub category: FileCategory,
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Answers usage questions about finalized snapshots.
///
/// Every aggregate is evaluated by the catalog; only directory rollups are
/// finished in memory, over one row per directory.
pub struct DiskAnalyzer {
    store: Arc<SnapshotStore>,
}

impl DiskAnalyzer {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// Load a snapshot, requiring it to be finalized.
    pub fn finalized(&self, snapshot_id: SnapshotId) -> Result<Snapshot> {
        let snapshot = self
            .store
            .get_snapshot(snapshot_id)?
            .ok_or(AnalyzeError::SnapshotNotFound(snapshot_id))?;
        if !snapshot.complete {
            return Err(AnalyzeError::SnapshotNotFinalized(snapshot_id));
        }
        Ok(snapshot)
    }

    /// The `n` largest files.
    pub fn largest_files(&self, snapshot_id: SnapshotId, n: usize) -> Result<Vec<FileRecord>> {
        self.finalized(snapshot_id)?;
        Ok(self.store.largest_files(snapshot_id, n)?)
    }

    /// The `n` directories holding the most bytes, counting subdirectories.
    ///
    /// Rollups stop at the snapshot roots; ancestors of a root are not
    /// reported.
    pub fn folder_rollup(&self, snapshot_id: SnapshotId, n: usize) -> Result<Vec<FolderUsage>> {
        let snapshot = self.finalized(snapshot_id)?;
        let direct = self.store.directory_totals(snapshot_id)?;

        let mut totals: HashMap<PathBuf, (u64, u64)> = HashMap::new();
        for dir in direct {
            let mut current: Option<&Path> = Some(dir.path.as_path());
            while let Some(path) = current {
                if !snapshot.covers(path) {
                    break;
                }
                let entry = totals.entry(path.to_path_buf()).or_default();
                entry.0 += dir.bytes;
                entry.1 += dir.file_count;
                current = path.parent();
            }
        }

        let mut folders: Vec<FolderUsage> = totals
            .into_iter()
            .map(|(path, (bytes, file_count))| FolderUsage {
                path,
                bytes,
                file_count,
            })
            .collect();
        folders.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.path.cmp(&b.path)));
        folders.truncate(n);
        Ok(folders)
    }

    /// The `n` extensions holding the most bytes.
    pub fn extension_frequency(&self, snapshot_id: SnapshotId, n: usize) -> Result<Vec<ExtensionCount>> {
        self.finalized(snapshot_id)?;
        let mut counts = self.store.extension_counts(snapshot_id)?;
        counts.truncate(n);
        Ok(counts)
    }

    /// Totals per category, in declaration order, including empty ones.
    pub fn category_distribution(&self, snapshot_id: SnapshotId) -> Result<Vec<CategoryUsage>> {
        self.finalized(snapshot_id)?;
        let mut by_category: HashMap<FileCategory, (u64, u64)> = HashMap::new();
        for count in self.store.extension_counts(snapshot_id)? {
            let category = count
                .extension
                .as_deref()
                .map(FileCategory::from_extension)
                .unwrap_or(FileCategory::Other);
            let entry = by_category.entry(category).or_default();
            entry.0 += count.file_count;
            entry.1 += count.total_bytes;
        }

        Ok(FileCategory::iter()
            .map(|category| {
                let (file_count, total_bytes) = by_category.get(&category).copied().unwrap_or_default();
                CategoryUsage {
                    category,
                    file_count,
                    total_bytes,
                }
            })
            .collect())
    }

    /// Cumulative share of bytes held by the largest files.
    pub fn pareto_curve(&self, snapshot_id: SnapshotId, points: usize) -> Result<Vec<ParetoPoint>> {
        self.finalized(snapshot_id)?;
        Ok(self.store.size_pareto(snapshot_id, points)?)
    }

    /// Base-10 log-scale size histogram.
    pub fn size_histogram(&self, snapshot_id: SnapshotId) -> Result<Vec<HistogramBucket>> {
        self.finalized(snapshot_id)?;
        Ok(self.store.size_histogram(snapshot_id)?)
    }

    /// Changes between two finalized snapshots of the same roots.
    pub fn growth(&self, base: SnapshotId, current: SnapshotId) -> Result<SnapshotDelta> {
        let base_snapshot = self.finalized(base)?;
        let current_snapshot = self.finalized(current)?;
        if base_snapshot.roots_key() != current_snapshot.roots_key() {
            return Err(AnalyzeError::RootsMismatch { base, current });
        }
        Ok(self.store.snapshot_delta(base, current)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(FileCategory::from_extension("jpg"), FileCategory::Image);
        assert_eq!(FileCategory::from_extension("mkv"), FileCategory::Video);
        assert_eq!(FileCategory::from_extension("flac"), FileCategory::Audio);
        assert_eq!(FileCategory::from_extension("pdf"), FileCategory::Document);
        assert_eq!(FileCategory::from_extension("zip"), FileCategory::Archive);
        assert_eq!(FileCategory::from_extension("rs"), FileCategory::Code);
        assert_eq!(FileCategory::from_extension("xyz"), FileCategory::Other);
        assert_eq!(FileCategory::iter().count(), 7);
        assert_eq!(FileCategory::Document.to_string(), "document");
    }
}
