//! Cleanup action types shared by the catalog and the cleanup engine.

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::record::{ActionId, RiskLevel, SnapshotId};

/// How the raw candidate list of a cleanup is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CleanupMode {
    /// Every duplicate except each cluster's representative.
    Duplicates,
    /// Files at least `min_size_bytes` large and not modified for `older_than_days`.
    LargeOld {
        min_size_bytes: u64,
        older_than_days: u32,
    },
    /// Log, temporary and cache files.
    LogsTemp,
    /// Caller-supplied paths.
    Explicit { paths: Vec<PathBuf> },
}

impl CleanupMode {
    /// Short name of the mode.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Duplicates => "duplicates",
            Self::LargeOld { .. } => "large_old",
            Self::LogsTemp => "logs_temp",
            Self::Explicit { .. } => "explicit",
        }
    }
}

/// Lifecycle state of a cleanup action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ActionState {
    /// Planned, nothing touched yet.
    Planned,
    /// Files were quarantined or removed.
    Executed,
    /// Restoration was attempted for every quarantine entry.
    Undone,
    /// Quarantined files were purged by the retention policy.
    Expired,
}

/// Why a candidate path was refused during planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    /// Under a statically denied system root.
    DangerousRoot { segment: String },
    /// Under a protected application or engine directory.
    ProtectedPath { rule: String },
    /// Not contained in any caller-supplied root.
    OutsideRoots,
    /// Not cataloged by the snapshot the action is planned against.
    NotInSnapshot,
    /// No longer a regular file.
    NotAFile,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DangerousRoot { segment } => write!(f, "under protected system root '/{segment}'"),
            Self::ProtectedPath { rule } => write!(f, "under protected path '{rule}'"),
            Self::OutsideRoots => write!(f, "outside of the requested roots"),
            Self::NotInSnapshot => write!(f, "not a file in the snapshot"),
            Self::NotAFile => write!(f, "not a regular file"),
        }
    }
}

/// A candidate refused during planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedPath {
    pub path: PathBuf,
    pub reason: RejectReason,
}

/// A file selected for cleanup, with the facts used to decide it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupTarget {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub risk: RiskLevel,
    /// Copy that must still hold the same content when this one is removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep: Option<PathBuf>,
}

/// A per-file failure during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPath {
    pub path: PathBuf,
    pub message: String,
}

impl FailedPath {
    /// Create a new failure entry.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of executing a cleanup action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Files quarantined or removed.
    pub deleted_count: u64,
    /// Bytes no longer present at their original paths.
    pub freed_bytes: u64,
    /// Files that could not be processed.
    pub failed_paths: Vec<FailedPath>,
}

/// Result of restoring a single quarantined file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Restored,
    Failed { message: String },
}

/// Per-entry undo result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub outcome: RestoreOutcome,
}

/// Outcome of undoing a cleanup action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoReport {
    pub restored: u64,
    pub failed: u64,
    pub results: Vec<RestoreResult>,
}

impl UndoReport {
    /// Check if every entry was restored.
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// A file held in quarantine on behalf of an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub action_id: ActionId,
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// One planned, executed or undone cleanup operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupAction {
    pub action_id: ActionId,
    pub snapshot_id: SnapshotId,
    pub created_at: DateTime<Utc>,
    pub mode: CleanupMode,
    pub roots: Vec<PathBuf>,
    pub candidates: Vec<PathBuf>,
    pub accepted: Vec<CleanupTarget>,
    pub rejected: Vec<RejectedPath>,
    pub skipped_high_risk: Vec<CleanupTarget>,
    pub executed: bool,
    pub quarantine_mode: bool,
    pub state: ActionState,
    pub executed_at: Option<DateTime<Utc>>,
    pub undone_at: Option<DateTime<Utc>>,
    pub execution: Option<ExecutionReport>,
    pub undo: Option<UndoReport>,
}

impl CleanupAction {
    /// Total size of the accepted targets.
    pub fn accepted_bytes(&self) -> u64 {
        self.accepted.iter().map(|t| t.size_bytes).sum()
    }

    /// Check that `accepted` is drawn from `candidates` and disjoint from
    /// `rejected` and `skipped_high_risk`.
    pub fn is_consistent(&self) -> bool {
        let candidates: HashSet<&PathBuf> = self.candidates.iter().collect();
        let excluded: HashSet<&PathBuf> = self
            .rejected
            .iter()
            .map(|r| &r.path)
            .chain(self.skipped_high_risk.iter().map(|s| &s.path))
            .collect();

        self.accepted
            .iter()
            .all(|t| candidates.contains(&t.path) && !excluded.contains(&t.path))
    }
}
