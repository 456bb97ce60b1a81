//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

use tidyvault_core::SnapshotId;

/// Progress published after every catalog batch.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    /// Snapshot being written.
    pub snapshot_id: SnapshotId,
    /// Files written to the catalog so far.
    pub files_scanned: u64,
    /// Total bytes of those files.
    pub bytes_scanned: u64,
    /// Directories read so far.
    pub dirs_scanned: u64,
    /// Directories skipped so far.
    pub dirs_skipped: u64,
    /// Last file of the batch.
    pub current_path: PathBuf,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_scanned as f64 / secs
        } else {
            0.0
        }
    }
}
