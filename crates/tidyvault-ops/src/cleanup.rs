//! Cleanup state machine: plan, execute, undo, expire.
//!
//! ```text
//! Planned ──execute──▶ Executed ──undo──▶ Undone
//!                         │
//!                         └──purge (retention)──▶ Expired
//! ```
//!
//! Planning reads the catalog and never modifies the filesystem. Execution
//! and undo of one action are serialized by a per-action lock; different
//! actions proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tidyvault_analyze::duplicates::full_hash;
use tidyvault_analyze::{DuplicateDetector, RiskPolicy, RiskScorer};
use tidyvault_core::{
    ActionId, ActionState, CleanupAction, CleanupMode, CleanupTarget, ExecutionReport, FailedPath,
    FileRecord, QuarantineEntry, RejectReason, RejectedPath, RestoreOutcome, RestoreResult,
    RiskLevel, Snapshot, SnapshotId, UndoReport,
};
use tidyvault_store::{FileFilter, SnapshotStore};

use crate::config::RetentionPolicy;
use crate::error::{CleanupError, Result};
use crate::guard::{normalize, PathGuard};
use crate::quarantine::Quarantine;

/// Outcome of a retention purge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Actions moved to `Expired`.
    pub expired_actions: Vec<ActionId>,
    /// Files purged, including ones an incomplete undo left behind.
    pub purged_files: u64,
    pub purged_bytes: u64,
    /// Quarantined files that could not be deleted. Their actions keep their state.
    pub failed_paths: Vec<FailedPath>,
}

/// A selected path and what planning knows about it.
enum Candidate {
    Cataloged {
        record: FileRecord,
        /// Duplicate that stays in place when this one goes.
        keep: Option<PathBuf>,
    },
    Refused(RejectReason),
}

/// Plans, executes and reverts cleanup actions against one catalog.
pub struct CleanupEngine {
    store: Arc<SnapshotStore>,
    detector: Arc<DuplicateDetector>,
    policy: RiskPolicy,
    guard: PathGuard,
    quarantine: Quarantine,
    retention: RetentionPolicy,
    locks: DashMap<ActionId, Arc<Mutex<()>>>,
}

impl CleanupEngine {
    pub fn new(
        store: Arc<SnapshotStore>,
        detector: Arc<DuplicateDetector>,
        policy: RiskPolicy,
        quarantine_dir: &Path,
    ) -> Self {
        let guard = PathGuard::new(quarantine_dir);
        let quarantine = Quarantine::new(guard.quarantine_dir());
        Self {
            store,
            detector,
            policy,
            guard,
            quarantine,
            retention: RetentionPolicy::default(),
            locks: DashMap::new(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn quarantine_dir(&self) -> &Path {
        self.quarantine.dir()
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    // ── Planning ─────────────────────────────────────────────────

    /// Select, validate and risk-classify the files `mode` would remove.
    ///
    /// An empty `roots` means the snapshot's own roots. Ages are measured
    /// against the snapshot's creation time, so planning the same mode over
    /// an unchanged snapshot selects the same files.
    pub fn plan_cleanup(
        &self,
        snapshot_id: SnapshotId,
        mode: CleanupMode,
        roots: &[PathBuf],
        force_high_risk: bool,
    ) -> Result<CleanupAction> {
        let snapshot = self.finalized(snapshot_id)?;

        let mut roots: Vec<PathBuf> = if roots.is_empty() {
            snapshot.roots.clone()
        } else {
            roots.iter().map(|r| normalize(r)).collect()
        };
        roots.sort();
        roots.dedup();
        if let Some(root) = self.guard.overlapping_root(&roots) {
            return Err(CleanupError::QuarantineOverlapsRoot {
                quarantine: self.guard.quarantine_dir().to_path_buf(),
                root: root.clone(),
            });
        }

        let scorer = RiskScorer::new(&self.policy, snapshot.created_at)?.with_roots(&snapshot.roots);
        let resolved = self.resolve(&snapshot, &mode, &scorer)?;

        let mut action = CleanupAction {
            action_id: ActionId::new(0),
            snapshot_id,
            created_at: Utc::now(),
            mode,
            roots,
            candidates: resolved.keys().cloned().collect(),
            accepted: Vec::new(),
            rejected: Vec::new(),
            skipped_high_risk: Vec::new(),
            executed: false,
            quarantine_mode: true,
            state: ActionState::Planned,
            executed_at: None,
            undone_at: None,
            execution: None,
            undo: None,
        };

        for (path, candidate) in resolved {
            let checked = self.guard.check(&path, &action.roots).and_then(|()| match candidate {
                Candidate::Cataloged { record, keep } => Ok((record, keep)),
                Candidate::Refused(reason) => Err(reason),
            });
            let (record, keep) = match checked {
                Ok(found) => found,
                Err(reason) => {
                    debug!("Rejected {}: {}", path.display(), reason);
                    action.rejected.push(RejectedPath { path, reason });
                    continue;
                }
            };
            let risk = scorer.classify(&record);
            let target = CleanupTarget {
                path,
                size_bytes: record.size_bytes,
                risk,
                keep,
            };
            if risk == RiskLevel::High && !force_high_risk {
                action.skipped_high_risk.push(target);
            } else {
                action.accepted.push(target);
            }
        }

        self.store.record_action(&mut action)?;
        info!(
            "Planned {} action {}: {} accepted ({} bytes), {} rejected, {} high risk skipped",
            action.mode.name(),
            action.action_id,
            action.accepted.len(),
            action.accepted_bytes(),
            action.rejected.len(),
            action.skipped_high_risk.len()
        );
        Ok(action)
    }

    /// Candidates keyed by normalized path.
    fn resolve(
        &self,
        snapshot: &Snapshot,
        mode: &CleanupMode,
        scorer: &RiskScorer,
    ) -> Result<BTreeMap<PathBuf, Candidate>> {
        let cataloged = |record: FileRecord, keep: Option<PathBuf>| {
            (normalize(&record.path), Candidate::Cataloged { record, keep })
        };
        match mode {
            CleanupMode::Duplicates => {
                let report = self.detector.detect(snapshot.id, &CancellationToken::new())?;
                Ok(report
                    .clusters
                    .iter()
                    .flat_map(|cluster| {
                        cluster
                            .redundant()
                            .map(|record| cataloged(record.clone(), Some(cluster.representative_path.clone())))
                    })
                    .collect())
            }
            CleanupMode::LargeOld {
                min_size_bytes,
                older_than_days,
            } => {
                let cutoff = snapshot.created_at - Duration::days(i64::from(*older_than_days));
                let filter = FileFilter::new()
                    .min_size(*min_size_bytes)
                    .modified_before(cutoff);
                Ok(self
                    .store
                    .files_matching(snapshot.id, &filter)?
                    .into_iter()
                    .map(|record| cataloged(record, None))
                    .collect())
            }
            CleanupMode::LogsTemp => {
                let mut junk = BTreeMap::new();
                self.store.for_each_file(snapshot.id, |record| {
                    if scorer.is_junk(&record) {
                        let (path, candidate) = cataloged(record, None);
                        junk.insert(path, candidate);
                    }
                })?;
                Ok(junk)
            }
            CleanupMode::Explicit { paths } => self.explicit(snapshot, paths),
        }
    }

    /// Candidates for caller-supplied paths. Only files the snapshot
    /// catalogs, and that are still files, can be selected.
    fn explicit(&self, snapshot: &Snapshot, paths: &[PathBuf]) -> Result<BTreeMap<PathBuf, Candidate>> {
        let normalized: Vec<PathBuf> = paths.iter().map(|p| normalize(p)).collect();
        let cataloged: HashMap<PathBuf, FileRecord> = self
            .store
            .files_at(snapshot.id, &normalized)?
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();

        Ok(normalized
            .into_iter()
            .map(|path| {
                let candidate = match cataloged.get(&path) {
                    None => Candidate::Refused(RejectReason::NotInSnapshot),
                    Some(_) if matches!(file_metadata(&path), Ok(None)) => {
                        Candidate::Refused(RejectReason::NotAFile)
                    }
                    Some(record) => Candidate::Cataloged {
                        record: record.clone(),
                        keep: None,
                    },
                };
                (path, candidate)
            })
            .collect())
    }

    // ── Execution ────────────────────────────────────────────────

    /// Remove the accepted files of a planned action.
    ///
    /// Nothing happens unless `confirm` is set. With `quarantine_mode` the
    /// files are moved into the quarantine and can be restored by
    /// [`undo_cleanup`](Self::undo_cleanup); without it they are deleted.
    pub fn execute_cleanup(
        &self,
        action_id: ActionId,
        confirm: bool,
        quarantine_mode: bool,
    ) -> Result<ExecutionReport> {
        if !confirm {
            return Err(CleanupError::ConfirmationRequired(action_id));
        }

        let lock = self.action_lock(action_id);
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut action = self.load(action_id)?;
        match action.state {
            ActionState::Planned => {}
            ActionState::Executed => return Err(CleanupError::AlreadyExecuted(action_id)),
            ActionState::Undone => return Err(CleanupError::AlreadyUndone(action_id)),
            ActionState::Expired => return Err(CleanupError::Expired(action_id)),
        }
        if quarantine_mode {
            if let Some(root) = self.guard.overlapping_root(&action.roots) {
                return Err(CleanupError::QuarantineOverlapsRoot {
                    quarantine: self.guard.quarantine_dir().to_path_buf(),
                    root: root.clone(),
                });
            }
        }

        let mut report = ExecutionReport::default();
        for target in &action.accepted {
            match self.remove_one(action_id, target, quarantine_mode) {
                Ok(size) => {
                    report.deleted_count += 1;
                    report.freed_bytes += size;
                }
                Err(e) => {
                    warn!("Could not remove {}: {}", target.path.display(), e);
                    report.failed_paths.push(FailedPath::new(&target.path, e.to_string()));
                }
            }
        }

        action.state = ActionState::Executed;
        action.executed = true;
        action.quarantine_mode = quarantine_mode;
        action.executed_at = Some(Utc::now());
        action.execution = Some(report.clone());
        self.store.update_action(&action)?;
        if !quarantine_mode {
            self.release_lock(action_id);
        }

        info!(
            "Executed action {}: {} files, {} bytes freed, {} failed",
            action_id,
            report.deleted_count,
            report.freed_bytes,
            report.failed_paths.len()
        );
        Ok(report)
    }

    /// Remove one accepted file and return the bytes it held.
    fn remove_one(&self, action_id: ActionId, target: &CleanupTarget, quarantine_mode: bool) -> Result<u64> {
        let meta = file_metadata(&target.path)?.ok_or_else(|| CleanupError::NotAFile(target.path.clone()))?;
        if let Some(kept) = &target.keep {
            self.verify_kept(target, kept)?;
        }
        let size = meta.len();
        if quarantine_mode {
            self.quarantine_one(action_id, &target.path, size)?;
        } else {
            fs::remove_file(&target.path)?;
        }
        Ok(size)
    }

    /// Check that the kept duplicate still holds the same bytes as `target`.
    fn verify_kept(&self, target: &CleanupTarget, kept: &Path) -> Result<()> {
        let buffer = self.detector.config().hash_buffer;
        let same = match (
            full_hash(kept, target.size_bytes, buffer),
            full_hash(&target.path, target.size_bytes, buffer),
        ) {
            (Ok(kept_hash), Ok(target_hash)) => kept_hash == target_hash,
            _ => false,
        };
        if !same {
            return Err(CleanupError::KeptCopyChanged(kept.to_path_buf()));
        }
        Ok(())
    }

    /// Move one file into quarantine and record it.
    ///
    /// If the entry cannot be recorded the file is moved back, so a file is
    /// never held without an entry.
    fn quarantine_one(&self, action_id: ActionId, path: &Path, size: u64) -> Result<()> {
        let held = self.quarantine.admit(action_id, path)?;
        let entry = QuarantineEntry {
            action_id,
            original_path: path.to_path_buf(),
            quarantine_path: held,
            size_bytes: size,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.insert_quarantine_entry(&entry) {
            if let Err(restore) = self.quarantine.restore(&entry) {
                warn!(
                    "{} is held at {} without an entry: {}",
                    path.display(),
                    entry.quarantine_path.display(),
                    restore
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    // ── Undo ─────────────────────────────────────────────────────

    /// Restore every quarantined file of an executed action.
    ///
    /// Each file is restored on its own; failures are reported per path and
    /// their entries kept. The action is `Undone` afterwards either way.
    pub fn undo_cleanup(&self, action_id: ActionId) -> Result<UndoReport> {
        let lock = self.action_lock(action_id);
        let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut action = self.load(action_id)?;
        match action.state {
            ActionState::Executed => {}
            ActionState::Planned => return Err(CleanupError::NotExecuted(action_id)),
            ActionState::Undone => return Err(CleanupError::AlreadyUndone(action_id)),
            ActionState::Expired => return Err(CleanupError::Expired(action_id)),
        }
        if !action.quarantine_mode {
            return Err(CleanupError::NotRecoverable(action_id));
        }

        let mut report = UndoReport::default();
        for entry in self.store.quarantine_entries(action_id)? {
            let outcome = match self.quarantine.restore(&entry) {
                Ok(()) => {
                    self.store.remove_quarantine_entry(action_id, &entry.original_path)?;
                    report.restored += 1;
                    RestoreOutcome::Restored
                }
                Err(e) => {
                    warn!("Could not restore {}: {}", entry.original_path.display(), e);
                    report.failed += 1;
                    RestoreOutcome::Failed {
                        message: e.to_string(),
                    }
                }
            };
            report.results.push(RestoreResult {
                original_path: entry.original_path,
                quarantine_path: entry.quarantine_path,
                outcome,
            });
        }
        self.quarantine.release(action_id);

        action.state = ActionState::Undone;
        action.undone_at = Some(Utc::now());
        action.undo = Some(report.clone());
        self.store.update_action(&action)?;
        if report.is_complete() {
            self.release_lock(action_id);
        }

        info!(
            "Undid action {}: {} restored, {} failed",
            action_id, report.restored, report.failed
        );
        Ok(report)
    }

    // ── Retention ────────────────────────────────────────────────

    /// Permanently delete quarantined files of actions executed longer ago
    /// than the retention TTL. Does nothing when retention is disabled.
    ///
    /// Executed actions become `Expired`. Undone actions keep their state,
    /// but files their undo could not restore are purged too.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let mut report = PurgeReport::default();
        let Some(cutoff) = self.retention.cutoff(now) else {
            debug!("Retention disabled, nothing to purge");
            return Ok(report);
        };

        let mut candidates = self.store.actions_in_state(ActionState::Executed)?;
        candidates.extend(self.store.actions_in_state(ActionState::Undone)?);
        for candidate in candidates {
            if !candidate.quarantine_mode || candidate.executed_at.is_none_or(|at| at > cutoff) {
                continue;
            }
            let action_id = candidate.action_id;
            let lock = self.action_lock(action_id);
            let _held = lock.lock().unwrap_or_else(PoisonError::into_inner);

            // Re-read under the lock; an undo may have won the race
            let mut action = self.load(action_id)?;
            if action.state != candidate.state {
                continue;
            }
            let entries = self.store.quarantine_entries(action_id)?;
            if action.state == ActionState::Undone && entries.is_empty() {
                continue;
            }

            let mut failed = false;
            for entry in entries {
                match self.quarantine.purge(&entry) {
                    Ok(()) => {
                        self.store.remove_quarantine_entry(action_id, &entry.original_path)?;
                        report.purged_files += 1;
                        report.purged_bytes += entry.size_bytes;
                    }
                    Err(e) => {
                        warn!("Could not purge {}: {}", entry.quarantine_path.display(), e);
                        report
                            .failed_paths
                            .push(FailedPath::new(&entry.quarantine_path, e.to_string()));
                        failed = true;
                    }
                }
            }
            if failed {
                continue;
            }

            self.quarantine.release(action_id);
            if action.state == ActionState::Executed {
                action.state = ActionState::Expired;
                self.store.update_action(&action)?;
                report.expired_actions.push(action_id);
            }
            self.release_lock(action_id);
        }

        if report.purged_files > 0 || !report.expired_actions.is_empty() {
            info!(
                "Expired {} actions, purged {} files ({} bytes)",
                report.expired_actions.len(),
                report.purged_files,
                report.purged_bytes
            );
        }
        Ok(report)
    }

    // ── Helpers ──────────────────────────────────────────────────

    fn finalized(&self, snapshot_id: SnapshotId) -> Result<Snapshot> {
        let snapshot = self
            .store
            .get_snapshot(snapshot_id)?
            .ok_or(CleanupError::SnapshotNotFound(snapshot_id))?;
        if !snapshot.complete {
            return Err(CleanupError::SnapshotNotFinalized(snapshot_id));
        }
        Ok(snapshot)
    }

    fn load(&self, action_id: ActionId) -> Result<CleanupAction> {
        self.store
            .get_action(action_id)?
            .ok_or(CleanupError::ActionNotFound(action_id))
    }

    fn action_lock(&self, action_id: ActionId) -> Arc<Mutex<()>> {
        self.locks.entry(action_id).or_default().clone()
    }

    /// Forget the lock of an action nothing can change any more.
    fn release_lock(&self, action_id: ActionId) {
        self.locks.remove(&action_id);
    }
}

/// Metadata of `path` if it is a regular file or a link to one.
fn file_metadata(path: &Path) -> io::Result<Option<fs::Metadata>> {
    let meta = fs::symlink_metadata(path)?;
    let is_file = meta.is_file()
        || (meta.file_type().is_symlink() && fs::metadata(path).is_ok_and(|m| m.is_file()));
    Ok(is_file.then_some(meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tidyvault_analyze::{DuplicateConfig, InlineExecutor};
    use tidyvault_core::ScanOptions;

    fn catalog(store: &SnapshotStore, root: &Path, files: &[PathBuf]) -> SnapshotId {
        let id = store.create_snapshot(&[root.to_path_buf()], ScanOptions::default()).unwrap();
        let old = Utc::now() - Duration::days(400);
        let records: Vec<FileRecord> = files
            .iter()
            .map(|path| FileRecord::new(id, path.clone(), fs::metadata(path).unwrap().len(), old))
            .collect();
        store.insert_file_batch(id, &records).unwrap();
        store.finalize_snapshot(id).unwrap();
        id
    }

    #[test]
    fn test_locks_are_dropped_once_actions_settle() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().canonicalize().unwrap();
        let root = base.join("data");
        fs::create_dir_all(&root).unwrap();
        let kept = root.join("a.log");
        let gone = root.join("b.log");
        fs::write(&kept, b"a").unwrap();
        fs::write(&gone, b"b").unwrap();

        let store = Arc::new(SnapshotStore::open_in_memory().unwrap());
        let detector = Arc::new(DuplicateDetector::new(
            Arc::clone(&store),
            Arc::new(InlineExecutor),
            DuplicateConfig::default(),
        ));
        let engine = CleanupEngine::new(
            Arc::clone(&store),
            detector,
            RiskPolicy::default(),
            &base.join("quarantine"),
        );
        let snapshot = catalog(&store, &root, &[kept.clone(), gone.clone()]);
        let explicit = |path: &PathBuf| CleanupMode::Explicit {
            paths: vec![path.clone()],
        };

        let quarantined = engine
            .plan_cleanup(snapshot, explicit(&kept), &[], false)
            .unwrap()
            .action_id;
        engine.execute_cleanup(quarantined, true, true).unwrap();
        // Still undoable
        assert!(engine.locks.contains_key(&quarantined));
        assert!(engine.undo_cleanup(quarantined).unwrap().is_complete());
        assert!(!engine.locks.contains_key(&quarantined));

        let removed = engine
            .plan_cleanup(snapshot, explicit(&gone), &[], false)
            .unwrap()
            .action_id;
        engine.execute_cleanup(removed, true, false).unwrap();
        assert!(!gone.exists());
        assert!(engine.locks.is_empty());
    }

    #[test]
    fn test_file_metadata_refuses_directories() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("f");
        fs::write(&file, b"x").unwrap();

        assert!(file_metadata(&file).unwrap().is_some());
        assert!(file_metadata(temp.path()).unwrap().is_none());
        assert!(file_metadata(&temp.path().join("missing")).is_err());
    }
}
