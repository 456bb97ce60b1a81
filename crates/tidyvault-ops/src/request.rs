//! Typed requests and responses for callers that drive the engine with
//! serialized messages.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use tidyvault_analyze::{
    CategoryUsage, DuplicateReport, ExtensionCount, FolderUsage, HistogramBucket, ParetoPoint,
    SnapshotDelta,
};
use tidyvault_core::{
    ActionId, CleanupAction, CleanupMode, ExecutionReport, FileRecord, ScanOptions, SkippedDirectory,
    Snapshot, SnapshotId, UndoReport,
};

use crate::cleanup::PurgeReport;
use crate::engine::Engine;
use crate::error::{CleanupError, Result};

fn default_limit() -> usize {
    20
}

fn default_points() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// One engine operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    Scan {
        roots: Vec<PathBuf>,
        #[serde(default)]
        follow_symlinks: bool,
        #[serde(default)]
        include_hidden: bool,
    },
    GetSnapshot {
        snapshot_id: SnapshotId,
    },
    LatestSnapshot {
        #[serde(default)]
        roots: Option<Vec<PathBuf>>,
    },
    ListSnapshots,
    LargestFiles {
        snapshot_id: SnapshotId,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    FolderRollup {
        snapshot_id: SnapshotId,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    ExtensionFrequency {
        snapshot_id: SnapshotId,
        #[serde(default = "default_limit")]
        limit: usize,
    },
    CategoryDistribution {
        snapshot_id: SnapshotId,
    },
    ParetoCurve {
        snapshot_id: SnapshotId,
        #[serde(default = "default_points")]
        points: usize,
    },
    SizeHistogram {
        snapshot_id: SnapshotId,
    },
    Growth {
        base: SnapshotId,
        current: SnapshotId,
    },
    DetectDuplicates {
        snapshot_id: SnapshotId,
    },
    PlanCleanup {
        snapshot_id: SnapshotId,
        mode: CleanupMode,
        #[serde(default)]
        roots: Vec<PathBuf>,
        #[serde(default)]
        force_high_risk: bool,
    },
    ExecuteCleanup {
        action_id: ActionId,
        #[serde(default)]
        confirm: bool,
        #[serde(default = "default_true")]
        quarantine_mode: bool,
    },
    UndoCleanup {
        action_id: ActionId,
    },
    GetAction {
        action_id: ActionId,
    },
    ListActions,
    PurgeExpired {
        /// Defaults to the current time.
        #[serde(default)]
        now: Option<DateTime<Utc>>,
    },
}

/// Result of a [`Request`], tagged the same way.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Scanned {
        snapshot: Snapshot,
        files_scanned: u64,
        bytes_scanned: u64,
        skipped_directories: Vec<SkippedDirectory>,
        cancelled: bool,
    },
    Snapshot {
        snapshot: Option<Snapshot>,
    },
    Snapshots {
        snapshots: Vec<Snapshot>,
    },
    Files {
        files: Vec<FileRecord>,
    },
    Folders {
        folders: Vec<FolderUsage>,
    },
    Extensions {
        extensions: Vec<ExtensionCount>,
    },
    Categories {
        categories: Vec<CategoryUsage>,
    },
    Pareto {
        points: Vec<ParetoPoint>,
    },
    Histogram {
        buckets: Vec<HistogramBucket>,
    },
    Growth {
        delta: SnapshotDelta,
    },
    Duplicates {
        report: DuplicateReport,
    },
    Action {
        action: CleanupAction,
    },
    Actions {
        actions: Vec<CleanupAction>,
    },
    Executed {
        report: ExecutionReport,
    },
    Undone {
        report: UndoReport,
    },
    Purged {
        report: PurgeReport,
    },
}

impl Engine {
    /// Run one request. `cancel` applies to scans and duplicate detection.
    pub fn handle(&self, request: Request, cancel: &CancellationToken) -> Result<Response> {
        let response = match request {
            Request::Scan {
                roots,
                follow_symlinks,
                include_hidden,
            } => {
                let options = ScanOptions {
                    follow_symlinks,
                    include_hidden,
                };
                let summary = self.create_snapshot(roots, options, cancel)?;
                Response::Scanned {
                    snapshot: summary.snapshot,
                    files_scanned: summary.files_scanned,
                    bytes_scanned: summary.bytes_scanned,
                    skipped_directories: summary.skipped_directories,
                    cancelled: summary.cancelled,
                }
            }
            Request::GetSnapshot { snapshot_id } => Response::Snapshot {
                snapshot: self.get_snapshot(snapshot_id)?,
            },
            Request::LatestSnapshot { roots } => Response::Snapshot {
                snapshot: self.latest_snapshot(roots.as_deref())?,
            },
            Request::ListSnapshots => Response::Snapshots {
                snapshots: self.list_snapshots()?,
            },
            Request::LargestFiles { snapshot_id, limit } => Response::Files {
                files: self.analyzer().largest_files(snapshot_id, limit)?,
            },
            Request::FolderRollup { snapshot_id, limit } => Response::Folders {
                folders: self.analyzer().folder_rollup(snapshot_id, limit)?,
            },
            Request::ExtensionFrequency { snapshot_id, limit } => Response::Extensions {
                extensions: self.analyzer().extension_frequency(snapshot_id, limit)?,
            },
            Request::CategoryDistribution { snapshot_id } => Response::Categories {
                categories: self.analyzer().category_distribution(snapshot_id)?,
            },
            Request::ParetoCurve { snapshot_id, points } => Response::Pareto {
                points: self.analyzer().pareto_curve(snapshot_id, points)?,
            },
            Request::SizeHistogram { snapshot_id } => Response::Histogram {
                buckets: self.analyzer().size_histogram(snapshot_id)?,
            },
            Request::Growth { base, current } => Response::Growth {
                delta: self.analyzer().growth(base, current)?,
            },
            Request::DetectDuplicates { snapshot_id } => Response::Duplicates {
                report: self.detect_duplicates(snapshot_id, cancel)?,
            },
            Request::PlanCleanup {
                snapshot_id,
                mode,
                roots,
                force_high_risk,
            } => Response::Action {
                action: self.plan_cleanup(snapshot_id, mode, &roots, force_high_risk)?,
            },
            Request::ExecuteCleanup {
                action_id,
                confirm,
                quarantine_mode,
            } => Response::Executed {
                report: self.execute_cleanup(action_id, confirm, quarantine_mode)?,
            },
            Request::UndoCleanup { action_id } => Response::Undone {
                report: self.undo_cleanup(action_id)?,
            },
            Request::GetAction { action_id } => Response::Action {
                action: self
                    .get_action(action_id)?
                    .ok_or(CleanupError::ActionNotFound(action_id))?,
            },
            Request::ListActions => Response::Actions {
                actions: self.list_actions()?,
            },
            Request::PurgeExpired { now } => Response::Purged {
                report: self.purge_expired(now.unwrap_or_else(Utc::now))?,
            },
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_are_tagged_by_kind() {
        let request: Request = serde_json::from_str(
            r#"{"kind": "plan_cleanup", "snapshot_id": 3,
                "mode": {"mode": "large_old", "min_size_bytes": 100, "older_than_days": 180}}"#,
        )
        .unwrap();

        assert_eq!(
            request,
            Request::PlanCleanup {
                snapshot_id: SnapshotId::new(3),
                mode: CleanupMode::LargeOld {
                    min_size_bytes: 100,
                    older_than_days: 180,
                },
                roots: Vec::new(),
                force_high_risk: false,
            }
        );
    }

    #[test]
    fn test_execute_defaults_are_safe() {
        let request: Request = serde_json::from_str(r#"{"kind": "execute_cleanup", "action_id": 9}"#).unwrap();
        assert_eq!(
            request,
            Request::ExecuteCleanup {
                action_id: ActionId::new(9),
                confirm: false,
                quarantine_mode: true,
            }
        );
    }

    #[test]
    fn test_unit_requests() {
        let request: Request = serde_json::from_str(r#"{"kind": "list_actions"}"#).unwrap();
        assert_eq!(request, Request::ListActions);
        assert!(serde_json::from_str::<Request>(r#"{"kind": "format_disk"}"#).is_err());
    }
}
