//! Duplicate file detection using content hashing.
//!
//! Uses a three-phase algorithm for efficiency:
//! 1. Group catalog records by size (in SQL, zero-byte files excluded), then
//!    drop files that changed since the scan and extra links to one inode
//! 2. Compute a partial hash (first window, plus last window for large files)
//! 3. Compute a full streaming BLAKE3 hash for partial-hash matches
//!
//! Only phase 3 decides membership; earlier phases just discard files that
//! cannot have a twin.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blake3::Hasher;
use derive_builder::Builder;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use chrono::{DateTime, Utc};
use tidyvault_core::{ContentHash, FileRecord, InodeInfo, SnapshotId};
use tidyvault_store::SnapshotStore;

use crate::error::{AnalyzeError, Result};
use crate::executor::{HashExecutor, HashTask, HashTicket};

/// One MiB.
const MIB: u64 = 1024 * 1024;

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct DuplicateConfig {
    /// Minimum file size to consider. Zero-byte files are never considered.
    #[builder(default = "1")]
    pub min_size: u64,

    /// Bytes hashed from each end of a file in the partial phase.
    ///
    /// The tail window is only read for files larger than twice this size.
    #[builder(default = "MIB")]
    pub partial_window: u64,

    /// Read buffer of the full-hash phase.
    #[builder(default = "64 * 1024")]
    pub hash_buffer: usize,

    /// Hashing threads (0 = available parallelism).
    #[builder(default = "0")]
    pub workers: usize,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            min_size: 1,
            partial_window: MIB,
            hash_buffer: 64 * 1024,
            workers: 0,
        }
    }
}

impl DuplicateConfigBuilder {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.partial_window == Some(0) {
            return Err("Partial window must be positive".to_string());
        }
        if self.hash_buffer == Some(0) {
            return Err("Hash buffer must be positive".to_string());
        }
        Ok(())
    }
}

impl DuplicateConfig {
    /// Create a new config builder.
    pub fn builder() -> DuplicateConfigBuilder {
        DuplicateConfigBuilder::default()
    }
}

/// A set of files with identical size and identical full content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCluster {
    /// Full BLAKE3 hash shared by every member.
    pub content_hash: ContentHash,
    /// Size of each member.
    pub size_bytes: u64,
    /// Members sorted by path; always at least two.
    pub members: Vec<FileRecord>,
    /// Lexicographically smallest member path; the copy that is kept.
    pub representative_path: PathBuf,
    /// `size_bytes * (members - 1)`.
    pub waste_bytes: u64,
}

impl DuplicateCluster {
    fn new(content_hash: ContentHash, size_bytes: u64, mut members: Vec<FileRecord>) -> Self {
        members.sort_by(|a, b| a.path.cmp(&b.path));
        let representative_path = members[0].path.clone();
        let waste_bytes = size_bytes * (members.len() as u64 - 1);
        Self {
            content_hash,
            size_bytes,
            members,
            representative_path,
            waste_bytes,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Members other than the representative.
    pub fn redundant(&self) -> impl Iterator<Item = &FileRecord> {
        self.members
            .iter()
            .filter(move |m| m.path != self.representative_path)
    }
}

/// Results from duplicate analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub snapshot_id: Option<SnapshotId>,
    /// Clusters sorted by waste descending, then hash.
    pub clusters: Vec<DuplicateCluster>,
    /// Files sharing their size with another file.
    pub files_considered: u64,
    /// Files that survived partial hashing.
    pub full_hash_candidates: u64,
    /// Files that vanished, changed size or mtime, or could not be read.
    pub dropped_files: u64,
    /// Additional hard links to a file already considered.
    #[serde(default)]
    pub hard_links: u64,
    /// Bytes reclaimable by keeping one copy per cluster.
    pub total_waste_bytes: u64,
}

impl DuplicateReport {
    pub fn has_duplicates(&self) -> bool {
        !self.clusters.is_empty()
    }

    /// Total number of files across all clusters.
    pub fn duplicate_files(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }
}

/// Finds duplicate content among the files of a snapshot.
pub struct DuplicateDetector {
    store: Arc<SnapshotStore>,
    executor: Arc<dyn HashExecutor>,
    config: DuplicateConfig,
}

impl DuplicateDetector {
    pub fn new(store: Arc<SnapshotStore>, executor: Arc<dyn HashExecutor>, config: DuplicateConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &DuplicateConfig {
        &self.config
    }

    /// Detect duplicates among the files of a finalized snapshot.
    ///
    /// Files are read from disk as they are now; records whose file has
    /// since disappeared or changed size or mtime are dropped, not reported
    /// as errors. Hard links to one inode count once, under the smallest path.
    pub fn detect(&self, snapshot_id: SnapshotId, cancel: &CancellationToken) -> Result<DuplicateReport> {
        let snapshot = self
            .store
            .get_snapshot(snapshot_id)?
            .ok_or(AnalyzeError::SnapshotNotFound(snapshot_id))?;
        if !snapshot.complete {
            return Err(AnalyzeError::SnapshotNotFinalized(snapshot_id));
        }

        // Phase 1: size groups
        let candidates = self
            .store
            .duplicate_size_candidates(snapshot_id, self.config.min_size)?;
        let files_considered = candidates.len() as u64;
        debug!(
            "Duplicate detection on snapshot {} via {} executor: {} size candidates",
            snapshot_id,
            self.executor.name(),
            files_considered
        );

        let current = revalidate(candidates);
        let mut dropped = current.dropped;

        // Phase 2: partial hashes
        let window = self.config.partial_window;
        let hashed = self.hash_all(current.files, cancel, move |path, size| {
            partial_hash(path, size, window)
        })?;
        dropped += hashed.dropped;
        let partial_groups = group_by_hash(hashed.files);

        let survivors: Vec<FileRecord> = partial_groups
            .into_values()
            .filter(|group| group.len() > 1)
            .flatten()
            .collect();
        let full_hash_candidates = survivors.len() as u64;

        // Phase 3: full verification
        let buffer = self.config.hash_buffer;
        let hashed = self.hash_all(survivors, cancel, move |path, size| {
            full_hash(path, size, buffer)
        })?;
        dropped += hashed.dropped;

        let mut clusters: Vec<DuplicateCluster> = group_by_hash(hashed.files)
            .into_iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|((size, hash), members)| DuplicateCluster::new(hash, size, members))
            .collect();
        clusters.sort_by(|a, b| {
            b.waste_bytes
                .cmp(&a.waste_bytes)
                .then_with(|| a.content_hash.cmp(&b.content_hash))
        });

        let total_waste_bytes = clusters.iter().map(|c| c.waste_bytes).sum();
        info!(
            "Snapshot {}: {} duplicate clusters, {} bytes reclaimable, {} files dropped, {} hard links skipped",
            snapshot_id,
            clusters.len(),
            total_waste_bytes,
            dropped,
            current.hard_links
        );

        Ok(DuplicateReport {
            snapshot_id: Some(snapshot_id),
            clusters,
            files_considered,
            full_hash_candidates,
            dropped_files: dropped,
            hard_links: current.hard_links,
            total_waste_bytes,
        })
    }

    /// Hash every record through the executor, keeping submission order.
    fn hash_all<F>(&self, records: Vec<FileRecord>, cancel: &CancellationToken, hash: F) -> Result<Hashed>
    where
        F: Fn(&Path, u64) -> io::Result<ContentHash> + Clone + Send + 'static,
    {
        let mut pending: Vec<(FileRecord, HashTicket)> = Vec::with_capacity(records.len());
        for record in records {
            if cancel.is_cancelled() {
                return Err(AnalyzeError::Cancelled);
            }
            let path = record.path.clone();
            let size = record.size_bytes;
            let token = cancel.clone();
            let hash = hash.clone();
            let task: HashTask = Box::new(move || {
                if token.is_cancelled() {
                    return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                }
                hash(&path, size)
            });
            let ticket = self.executor.submit(task);
            pending.push((record, ticket));
        }

        let mut hashed = Hashed::default();
        for (record, ticket) in pending {
            if cancel.is_cancelled() {
                return Err(AnalyzeError::Cancelled);
            }
            match ticket.wait() {
                Ok(hash) => hashed.files.push((record, hash)),
                Err(err) => {
                    debug!("Dropping {}: {}", record.path.display(), err);
                    hashed.dropped += 1;
                }
            }
        }
        Ok(hashed)
    }
}

#[derive(Default)]
struct Hashed {
    files: Vec<(FileRecord, ContentHash)>,
    dropped: u64,
}

#[derive(Default)]
struct Revalidated {
    files: Vec<FileRecord>,
    dropped: u64,
    hard_links: u64,
}

/// Keep records whose file still matches the catalog, one per inode.
///
/// Records arrive ordered by path within each size, so the first link seen
/// is the smallest path.
fn revalidate(records: Vec<FileRecord>) -> Revalidated {
    let mut seen: HashSet<InodeInfo> = HashSet::new();
    let mut out = Revalidated::default();
    for record in records {
        let metadata = match fs::metadata(&record.path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                debug!("Dropping {}: no longer a regular file", record.path.display());
                out.dropped += 1;
                continue;
            }
            Err(err) => {
                debug!("Dropping {}: {}", record.path.display(), err);
                out.dropped += 1;
                continue;
            }
        };
        if !matches_record(&metadata, &record) {
            debug!("Dropping {}: changed since the scan", record.path.display());
            out.dropped += 1;
            continue;
        }
        if let Some(inode) = InodeInfo::of(&metadata) {
            if !seen.insert(inode) {
                debug!("Skipping {}: hard link to a file already considered", record.path.display());
                out.hard_links += 1;
                continue;
            }
        }
        out.files.push(record);
    }
    out
}

/// Size and whole-second mtime agree with the cataloged record.
fn matches_record(metadata: &fs::Metadata, record: &FileRecord) -> bool {
    if metadata.len() != record.size_bytes {
        return false;
    }
    match metadata.modified() {
        Ok(modified) => DateTime::<Utc>::from(modified).timestamp() == record.mtime.timestamp(),
        Err(_) => true,
    }
}

/// Group hashed records by (size, hash), ordered for deterministic output.
fn group_by_hash(files: Vec<(FileRecord, ContentHash)>) -> BTreeMap<(u64, ContentHash), Vec<FileRecord>> {
    files
        .into_iter()
        .map(|(record, hash)| ((record.size_bytes, hash), record))
        .into_group_map()
        .into_iter()
        .collect()
}

/// Open a file and check it still has the cataloged size.
fn open_unchanged(path: &Path, expected_size: u64) -> io::Result<File> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    if size != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("size changed from {expected_size} to {size}"),
        ));
    }
    Ok(file)
}

/// Hash the head window, plus the tail window for files over twice its size.
pub fn partial_hash(path: &Path, expected_size: u64, window: u64) -> io::Result<ContentHash> {
    let mut file = open_unchanged(path, expected_size)?;
    let mut hasher = Hasher::new();

    let head = window.min(expected_size);
    let mut buf = vec![0u8; head as usize];
    file.read_exact(&mut buf)?;
    hasher.update(&buf);

    if expected_size > window.saturating_mul(2) {
        file.seek(SeekFrom::End(-(window as i64)))?;
        buf.resize(window as usize, 0);
        file.read_exact(&mut buf)?;
        hasher.update(&buf);
    }

    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

/// Streaming BLAKE3 hash of the whole file with a fixed-size buffer.
pub fn full_hash(path: &Path, expected_size: u64, buffer_size: usize) -> io::Result<ContentHash> {
    let mut file = open_unchanged(path, expected_size)?;
    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        let n = match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..n]);
        total += n as u64;
    }

    if total != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("read {total} bytes, expected {expected_size}"),
        ));
    }
    Ok(ContentHash::new(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_files() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::write(root.join("file1.txt"), "duplicate content here").unwrap();
        fs::write(root.join("file2.txt"), "duplicate content here").unwrap();
        fs::write(root.join("file3.txt"), "unique content").unwrap();

        temp
    }

    #[test]
    fn test_full_hash() {
        let temp = create_test_files();
        let hash1 = full_hash(&temp.path().join("file1.txt"), 22, 4).unwrap();
        let hash2 = full_hash(&temp.path().join("file2.txt"), 22, 64 * 1024).unwrap();
        let hash3 = full_hash(&temp.path().join("file3.txt"), 14, 64 * 1024).unwrap();

        // Buffer size does not change the digest
        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.0, *blake3::hash(b"duplicate content here").as_bytes());
    }

    #[test]
    fn test_size_change_is_an_error() {
        let temp = create_test_files();
        assert!(full_hash(&temp.path().join("file1.txt"), 21, 1024).is_err());
        assert!(partial_hash(&temp.path().join("file1.txt"), 23, 1024).is_err());
        assert!(partial_hash(&temp.path().join("missing"), 1, 1024).is_err());
    }

    #[test]
    fn test_partial_hash_reads_tail_of_large_files() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");

        // 40 bytes with an 8 byte window: head and tail hashed, middle ignored
        let mut content = vec![0u8; 40];
        fs::write(&a, &content).unwrap();
        content[20] = 1;
        fs::write(&b, &content).unwrap();
        assert_eq!(partial_hash(&a, 40, 8).unwrap(), partial_hash(&b, 40, 8).unwrap());

        content[39] = 1;
        fs::write(&b, &content).unwrap();
        assert_ne!(partial_hash(&a, 40, 8).unwrap(), partial_hash(&b, 40, 8).unwrap());
    }

    #[test]
    fn test_cluster_representative_and_waste() {
        let mtime = chrono::Utc::now();
        let members = vec![
            FileRecord::new(SnapshotId::new(1), "/b/copy", 10, mtime),
            FileRecord::new(SnapshotId::new(1), "/a/original", 10, mtime),
            FileRecord::new(SnapshotId::new(1), "/c/copy", 10, mtime),
        ];
        let cluster = DuplicateCluster::new(ContentHash::new([1; 32]), 10, members);

        assert_eq!(cluster.representative_path, PathBuf::from("/a/original"));
        assert_eq!(cluster.waste_bytes, 20);
        assert_eq!(cluster.redundant().count(), 2);
        assert!(cluster.redundant().all(|m| m.path != cluster.representative_path));
    }

    #[test]
    fn test_config_builder_rejects_zero_window() {
        assert!(DuplicateConfig::builder().partial_window(0u64).build().is_err());
        let config = DuplicateConfig::builder().build().unwrap();
        assert_eq!(config.partial_window, MIB);
        assert_eq!(config.hash_buffer, 64 * 1024);
    }
}
