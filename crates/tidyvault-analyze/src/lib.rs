//! Analysis algorithms for tidyvault.
//!
//! This crate answers questions about cataloged snapshots:
//!
//! - **Duplicate detection** - Find identical files using BLAKE3 hashing
//! - **Risk scoring** - Classify deletion candidates as low, medium or high risk
//! - **Disk usage** - Largest files, folder rollups, extensions, categories,
//!   size distribution and growth between snapshots
//!
//! # Duplicate Detection
//!
//! Uses a three-phase algorithm for efficiency:
//!
//! 1. Group files by size (in the catalog)
//! 2. Compute a partial hash (first + last 1 MiB) for size-matched files
//! 3. Compute a full BLAKE3 hash for partial-hash matches
//!
//! Hashing runs on a [`HashExecutor`]; [`select_executor`] picks a thread
//! pool when one can be started and hashes inline otherwise.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidyvault_analyze::{select_executor, DuplicateConfig, DuplicateDetector};
//! use tidyvault_store::SnapshotStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(SnapshotStore::open("catalog.db").unwrap());
//! let snapshot = store.latest_snapshot(None).unwrap().unwrap();
//!
//! let detector = DuplicateDetector::new(store, select_executor(0), DuplicateConfig::default());
//! let report = detector.detect(snapshot.id, &CancellationToken::new()).unwrap();
//!
//! println!("Found {} duplicate clusters", report.clusters.len());
//! println!("Wasted space: {} bytes", report.total_waste_bytes);
//! ```
//!
//! # Risk Scoring
//!
//! ```rust
//! use chrono::Utc;
//! use tidyvault_analyze::{RiskPolicy, RiskScorer};
//! use tidyvault_core::{FileRecord, RiskLevel, SnapshotId};
//!
//! let scorer = RiskScorer::new(&RiskPolicy::default(), Utc::now()).unwrap();
//! let record = FileRecord::new(SnapshotId::new(1), "/home/user/.cache/thumb.png", 10, Utc::now());
//! assert_eq!(scorer.classify(&record), RiskLevel::Low);
//! ```

pub mod duplicates;
mod error;
pub mod executor;
pub mod risk;
pub mod usage;

pub use duplicates::{DuplicateCluster, DuplicateConfig, DuplicateConfigBuilder, DuplicateDetector, DuplicateReport};
pub use error::{AnalyzeError, Result};
pub use executor::{select_executor, HashExecutor, HashTask, HashTicket, InlineExecutor, PoolExecutor};
pub use risk::{RiskPolicy, RiskReason, RiskScorer};
pub use usage::{CategoryUsage, DiskAnalyzer, FileCategory, FolderUsage};

// Re-export catalog result types
pub use tidyvault_store::{ExtensionCount, HistogramBucket, ParetoPoint, SnapshotDelta};
