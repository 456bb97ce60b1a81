//! Snapshot scanner.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tidyvault_core::{roots_key, FileRecord, ScanConfig, SkippedDirectory, Snapshot, SnapshotId};
use tidyvault_store::{SnapshotStore, StoreError};

use crate::error::ScanError;
use crate::progress::ScanProgress;
use crate::walk::{WalkEvent, Walker};

/// Outcome of a scan.
#[derive(Debug, Clone)]
pub struct ScanSummary {
    /// The snapshot as stored. Not complete when the scan was cancelled.
    pub snapshot: Snapshot,
    pub files_scanned: u64,
    pub bytes_scanned: u64,
    pub skipped_directories: Vec<SkippedDirectory>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Populates catalog snapshots from the filesystem.
///
/// At most one scan per root set runs at a time; scans of different root
/// sets may run concurrently from different threads.
pub struct FileScanner {
    store: Arc<SnapshotStore>,
    progress_tx: broadcast::Sender<ScanProgress>,
    in_flight: Arc<DashMap<String, Instant>>,
}

impl FileScanner {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            store,
            progress_tx,
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Subscribe to per-batch progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Scan `config.roots` into a new snapshot and finalize it.
    ///
    /// If `cancel` fires, the records written so far stay in a snapshot
    /// that is never finalized.
    pub fn scan(&self, config: &ScanConfig, cancel: &CancellationToken) -> Result<ScanSummary, ScanError> {
        let start = Instant::now();
        let roots = canonical_roots(&config.roots)?;
        let key = roots_key(&roots);
        let _guard = InFlight::acquire(&self.in_flight, key)?;

        let snapshot_id = self.store.create_snapshot(&roots, config.options())?;
        info!("Scanning {} root(s) into snapshot {}", roots.len(), snapshot_id);

        let mut walker = Walker::new(snapshot_id, &roots, config.options());
        let mut batch = Batch::new(snapshot_id, config.batch_size.max(1), start);
        let mut skipped = Vec::new();
        let mut cancelled = false;

        loop {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let Some(event) = walker.next() else {
                break;
            };
            match event {
                WalkEvent::File(record) => {
                    if batch.push(record) {
                        self.flush(&mut batch, &walker, &skipped)?;
                    }
                }
                WalkEvent::DirectorySkipped(dir) => skipped.push(dir),
            }
        }
        self.flush(&mut batch, &walker, &skipped)?;

        let snapshot = if cancelled {
            info!(
                "Scan of snapshot {} cancelled after {} files",
                snapshot_id, batch.files
            );
            self.store
                .get_snapshot(snapshot_id)?
                .ok_or(StoreError::SnapshotNotFound(snapshot_id))?
        } else {
            self.store.finalize_snapshot(snapshot_id)?
        };

        Ok(ScanSummary {
            snapshot,
            files_scanned: batch.files,
            bytes_scanned: batch.bytes,
            skipped_directories: skipped,
            cancelled,
            elapsed: start.elapsed(),
        })
    }

    /// Write the buffered records and publish the running totals.
    fn flush(&self, batch: &mut Batch, walker: &Walker, skipped: &[SkippedDirectory]) -> Result<(), ScanError> {
        if batch.records.is_empty() {
            return Ok(());
        }
        self.store.insert_file_batch(batch.snapshot_id, &batch.records)?;
        debug!(
            "Flushed {} records into snapshot {}",
            batch.records.len(),
            batch.snapshot_id
        );

        let progress = ScanProgress {
            snapshot_id: batch.snapshot_id,
            files_scanned: batch.files,
            bytes_scanned: batch.bytes,
            dirs_scanned: walker.dirs_read(),
            dirs_skipped: skipped.len() as u64,
            current_path: batch.records.last().map(|r| r.path.clone()).unwrap_or_default(),
            elapsed: batch.start.elapsed(),
        };
        batch.records.clear();

        // Nobody listening is fine
        let _ = self.progress_tx.send(progress);
        Ok(())
    }
}

/// Records waiting for the next catalog write, plus running totals.
struct Batch {
    snapshot_id: SnapshotId,
    records: Vec<FileRecord>,
    capacity: usize,
    files: u64,
    bytes: u64,
    start: Instant,
}

impl Batch {
    fn new(snapshot_id: SnapshotId, capacity: usize, start: Instant) -> Self {
        Self {
            snapshot_id,
            records: Vec::with_capacity(capacity),
            capacity,
            files: 0,
            bytes: 0,
            start,
        }
    }

    /// Buffer a record. Returns true when the batch is full.
    fn push(&mut self, record: FileRecord) -> bool {
        self.files += 1;
        self.bytes += record.size_bytes;
        self.records.push(record);
        self.records.len() >= self.capacity
    }
}

/// Canonicalize and validate scan roots.
fn canonical_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>, ScanError> {
    if roots.is_empty() {
        return Err(ScanError::NoRoots);
    }
    let mut canonical = Vec::with_capacity(roots.len());
    for root in roots {
        let path = root
            .canonicalize()
            .map_err(|e| ScanError::invalid_root(root, e))?;
        if !path.is_dir() {
            return Err(ScanError::invalid_root(root, "not a directory"));
        }
        canonical.push(path);
    }

    // Ancestors sort before their descendants; a root inside another is
    // already covered by the outer walk.
    canonical.sort();
    canonical.dedup();
    let mut collapsed: Vec<PathBuf> = Vec::with_capacity(canonical.len());
    for path in canonical {
        if let Some(outer) = collapsed.iter().find(|outer| path.starts_with(outer)) {
            debug!("Root {} is covered by {}", path.display(), outer.display());
            continue;
        }
        collapsed.push(path);
    }
    Ok(collapsed)
}

/// Registration of a running scan; released on drop.
struct InFlight {
    map: Arc<DashMap<String, Instant>>,
    key: String,
}

impl InFlight {
    fn acquire(map: &Arc<DashMap<String, Instant>>, key: String) -> Result<Self, ScanError> {
        match map.entry(key.clone()) {
            Entry::Occupied(_) => Err(ScanError::AlreadyScanning {
                roots: key.replace('\n', ", "),
            }),
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Ok(Self {
                    map: Arc::clone(map),
                    key,
                })
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let map = Arc::new(DashMap::new());
        let guard = InFlight::acquire(&map, "/data".to_string()).unwrap();

        let second = InFlight::acquire(&map, "/data".to_string());
        assert!(matches!(second, Err(ScanError::AlreadyScanning { .. })));
        assert!(InFlight::acquire(&map, "/other".to_string()).is_ok());

        drop(guard);
        assert!(InFlight::acquire(&map, "/data".to_string()).is_ok());
    }

    #[test]
    fn test_canonical_roots_rejects_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(canonical_roots(&[]), Err(ScanError::NoRoots)));
        assert!(matches!(
            canonical_roots(&[file]),
            Err(ScanError::InvalidRoot { .. })
        ));
        assert!(matches!(
            canonical_roots(&[temp.path().join("missing")]),
            Err(ScanError::InvalidRoot { .. })
        ));
    }
}
