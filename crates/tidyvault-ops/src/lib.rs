//! Cleanup engine for tidyvault.
//!
//! Turns analysis results into reversible deletions:
//!
//! - [`CleanupEngine::plan_cleanup`] selects candidates for a [`CleanupMode`],
//!   rejects paths outside the caller's roots or under protected locations,
//!   and sets high-risk files aside. Nothing on disk changes.
//! - [`CleanupEngine::execute_cleanup`] moves the accepted files into the
//!   quarantine (or deletes them) once the caller confirms.
//! - [`CleanupEngine::undo_cleanup`] moves quarantined files back.
//! - [`CleanupEngine::purge_expired`] applies the configured
//!   [`RetentionPolicy`].
//!
//! [`Engine`] wires the catalog, scanner, analyzers and cleanup engine
//! together, and [`Engine::handle`] runs serialized [`Request`]s.
//!
//! ```rust,no_run
//! use tidyvault_core::{CleanupMode, ScanOptions};
//! use tidyvault_ops::{Engine, EngineConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let engine = Engine::open(EngineConfig::default()).unwrap();
//! let cancel = CancellationToken::new();
//! let summary = engine
//!     .create_snapshot(vec!["/home/user/Downloads".into()], ScanOptions::default(), &cancel)
//!     .unwrap();
//!
//! let action = engine
//!     .plan_cleanup(summary.snapshot.id, CleanupMode::Duplicates, &[], false)
//!     .unwrap();
//! let report = engine.execute_cleanup(action.action_id, true, true).unwrap();
//! println!("Freed {} bytes", report.freed_bytes);
//!
//! engine.undo_cleanup(action.action_id).unwrap();
//! ```

pub mod cleanup;
mod config;
mod engine;
mod error;
pub mod guard;
pub mod quarantine;
mod request;

pub use cleanup::{CleanupEngine, PurgeReport};
pub use config::{EngineConfig, RetentionPolicy};
pub use engine::Engine;
pub use error::{CleanupError, Result};
pub use guard::PathGuard;
pub use quarantine::Quarantine;
pub use request::{Request, Response};

// Re-export action types
pub use tidyvault_core::{
    ActionId, ActionState, CleanupAction, CleanupMode, ExecutionReport, RejectReason, UndoReport,
};
