//! Filesystem scanner for tidyvault.
//!
//! `tidyvault-scan` walks a set of roots and writes what it finds into a
//! new catalog snapshot. Key features:
//!
//! - **Explicit-stack traversal**, so deep trees never exhaust the call stack
//! - **Soft failures**: unreadable directories are reported, not fatal
//! - **Bounded batches** written one transaction at a time
//! - **Progress updates** via broadcast channels
//! - **Cancellation** between files, leaving a queryable partial snapshot
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tidyvault_scan::{FileScanner, ScanConfig};
//! use tidyvault_store::SnapshotStore;
//! use tokio_util::sync::CancellationToken;
//!
//! let store = Arc::new(SnapshotStore::open("catalog.db").unwrap());
//! let scanner = FileScanner::new(store);
//! let summary = scanner
//!     .scan(&ScanConfig::new(["/home/user/Downloads"]), &CancellationToken::new())
//!     .unwrap();
//!
//! println!("Cataloged {} files", summary.snapshot.file_count);
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use tidyvault_scan::FileScanner;
//! # use tidyvault_store::SnapshotStore;
//! # let scanner = FileScanner::new(Arc::new(SnapshotStore::open_in_memory().unwrap()));
//! let mut progress_rx = scanner.subscribe();
//!
//! tokio::spawn(async move {
//!     while let Ok(progress) = progress_rx.recv().await {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod error;
mod inode;
mod progress;
mod scanner;
mod walk;

pub use error::ScanError;
pub use inode::InodeTracker;
pub use progress::ScanProgress;
pub use scanner::{FileScanner, ScanSummary};
pub use walk::{WalkEvent, Walker};

// Re-export core types for convenience
pub use tidyvault_core::{ScanConfig, ScanOptions, SkipReason, SkippedDirectory};
