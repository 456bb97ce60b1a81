//! The engine facade: one catalog, one quarantine, every operation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tidyvault_analyze::{select_executor, DiskAnalyzer, DuplicateDetector, DuplicateReport, HashExecutor};
use tidyvault_core::{
    ActionId, CleanupAction, CleanupMode, ExecutionReport, ScanConfig, ScanOptions, Snapshot,
    SnapshotId, UndoReport,
};
use tidyvault_scan::{FileScanner, ScanProgress, ScanSummary};
use tidyvault_store::SnapshotStore;

use crate::cleanup::{CleanupEngine, PurgeReport};
use crate::config::EngineConfig;
use crate::error::{CleanupError, Result};
use crate::guard::normalize;

/// Wires the catalog, scanner, analyzers and cleanup engine together.
///
/// All methods take `&self`; an `Engine` can be shared across threads
/// behind an `Arc`.
pub struct Engine {
    config: EngineConfig,
    store: Arc<SnapshotStore>,
    scanner: FileScanner,
    analyzer: DiskAnalyzer,
    detector: Arc<DuplicateDetector>,
    cleanup: CleanupEngine,
}

impl Engine {
    /// Open the catalog named by `config`, creating it if needed.
    pub fn open(config: EngineConfig) -> Result<Self> {
        let store = SnapshotStore::open(&config.catalog_path)?;
        info!("Opened catalog {}", config.catalog_path.display());
        let executor = select_executor(config.duplicates.workers);
        Ok(Self::with_store(Arc::new(store), executor, config))
    }

    /// Build an engine over an already opened catalog.
    pub fn with_store(store: Arc<SnapshotStore>, executor: Arc<dyn HashExecutor>, config: EngineConfig) -> Self {
        let detector = Arc::new(DuplicateDetector::new(
            Arc::clone(&store),
            executor,
            config.duplicates.clone(),
        ));
        let cleanup = CleanupEngine::new(
            Arc::clone(&store),
            Arc::clone(&detector),
            config.risk.clone(),
            &config.quarantine_dir,
        )
        .with_retention(config.retention);

        Self {
            scanner: FileScanner::new(Arc::clone(&store)),
            analyzer: DiskAnalyzer::new(Arc::clone(&store)),
            detector,
            cleanup,
            store,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Usage aggregates over finalized snapshots.
    pub fn analyzer(&self) -> &DiskAnalyzer {
        &self.analyzer
    }

    pub fn cleanup(&self) -> &CleanupEngine {
        &self.cleanup
    }

    // ── Snapshots ────────────────────────────────────────────────

    /// Scan `roots` into a new snapshot.
    pub fn create_snapshot(
        &self,
        roots: Vec<PathBuf>,
        options: ScanOptions,
        cancel: &CancellationToken,
    ) -> Result<ScanSummary> {
        let config = ScanConfig::builder()
            .roots(roots)
            .follow_symlinks(options.follow_symlinks)
            .include_hidden(options.include_hidden)
            .batch_size(self.config.scan_batch_size)
            .build()
            .map_err(|e| CleanupError::Config(e.to_string()))?;
        Ok(self.scanner.scan(&config, cancel)?)
    }

    /// Progress of scans started after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.scanner.subscribe()
    }

    pub fn get_snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<Snapshot>> {
        Ok(self.store.get_snapshot(snapshot_id)?)
    }

    /// Newest finalized snapshot, optionally of exactly `roots`.
    pub fn latest_snapshot(&self, roots: Option<&[PathBuf]>) -> Result<Option<Snapshot>> {
        let roots = roots.map(|roots| roots.iter().map(|r| normalize(r)).collect::<Vec<_>>());
        Ok(self.store.latest_snapshot(roots.as_deref())?)
    }

    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        Ok(self.store.list_snapshots()?)
    }

    // ── Duplicates ───────────────────────────────────────────────

    pub fn detect_duplicates(&self, snapshot_id: SnapshotId, cancel: &CancellationToken) -> Result<DuplicateReport> {
        Ok(self.detector.detect(snapshot_id, cancel)?)
    }

    // ── Cleanup ──────────────────────────────────────────────────

    pub fn plan_cleanup(
        &self,
        snapshot_id: SnapshotId,
        mode: CleanupMode,
        roots: &[PathBuf],
        force_high_risk: bool,
    ) -> Result<CleanupAction> {
        self.cleanup.plan_cleanup(snapshot_id, mode, roots, force_high_risk)
    }

    pub fn execute_cleanup(&self, action_id: ActionId, confirm: bool, quarantine_mode: bool) -> Result<ExecutionReport> {
        self.cleanup.execute_cleanup(action_id, confirm, quarantine_mode)
    }

    pub fn undo_cleanup(&self, action_id: ActionId) -> Result<UndoReport> {
        self.cleanup.undo_cleanup(action_id)
    }

    pub fn get_action(&self, action_id: ActionId) -> Result<Option<CleanupAction>> {
        Ok(self.store.get_action(action_id)?)
    }

    pub fn list_actions(&self) -> Result<Vec<CleanupAction>> {
        Ok(self.store.list_actions()?)
    }

    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        self.cleanup.purge_expired(now)
    }
}
