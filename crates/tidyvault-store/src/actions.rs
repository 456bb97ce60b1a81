use std::path::{Path, PathBuf};

use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tidyvault_core::{
    ActionId, ActionState, CleanupAction, CleanupMode, CleanupTarget, ExecutionReport,
    QuarantineEntry, RejectedPath, SnapshotId, UndoReport,
};

use crate::convert::{from_millis, path_text, to_millis};
use crate::error::{Result, StoreError};
use crate::sqlite::SnapshotStore;

const ACTION_COLUMNS: &str =
    "id, snapshot_id, created_at, state, executed, quarantine_mode, executed_at, undone_at, body";

/// Action fields without a column of their own, stored as JSON.
#[derive(Serialize, Deserialize)]
struct ActionBody {
    mode: CleanupMode,
    roots: Vec<PathBuf>,
    candidates: Vec<PathBuf>,
    accepted: Vec<CleanupTarget>,
    rejected: Vec<RejectedPath>,
    skipped_high_risk: Vec<CleanupTarget>,
    execution: Option<ExecutionReport>,
    undo: Option<UndoReport>,
}

impl ActionBody {
    fn of(action: &CleanupAction) -> Self {
        Self {
            mode: action.mode.clone(),
            roots: action.roots.clone(),
            candidates: action.candidates.clone(),
            accepted: action.accepted.clone(),
            rejected: action.rejected.clone(),
            skipped_high_risk: action.skipped_high_risk.clone(),
            execution: action.execution.clone(),
            undo: action.undo.clone(),
        }
    }
}

struct ActionRow {
    id: i64,
    snapshot_id: i64,
    created_at: i64,
    state: String,
    executed: bool,
    quarantine_mode: bool,
    executed_at: Option<i64>,
    undone_at: Option<i64>,
    body: String,
}

impl ActionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            snapshot_id: row.get(1)?,
            created_at: row.get(2)?,
            state: row.get(3)?,
            executed: row.get(4)?,
            quarantine_mode: row.get(5)?,
            executed_at: row.get(6)?,
            undone_at: row.get(7)?,
            body: row.get(8)?,
        })
    }

    fn into_action(self) -> Result<CleanupAction> {
        let state: ActionState = self.state.parse().map_err(|_| StoreError::InvalidColumn {
            column: "state",
            value: self.state.clone(),
        })?;
        let body: ActionBody = serde_json::from_str(&self.body)?;
        Ok(CleanupAction {
            action_id: ActionId::new(self.id),
            snapshot_id: SnapshotId::new(self.snapshot_id),
            created_at: from_millis(self.created_at),
            mode: body.mode,
            roots: body.roots,
            candidates: body.candidates,
            accepted: body.accepted,
            rejected: body.rejected,
            skipped_high_risk: body.skipped_high_risk,
            executed: self.executed,
            quarantine_mode: self.quarantine_mode,
            state,
            executed_at: self.executed_at.map(from_millis),
            undone_at: self.undone_at.map(from_millis),
            execution: body.execution,
            undo: body.undo,
        })
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QuarantineEntry> {
    let original: String = row.get(1)?;
    let quarantine: String = row.get(2)?;
    Ok(QuarantineEntry {
        action_id: ActionId::new(row.get(0)?),
        original_path: original.into(),
        quarantine_path: quarantine.into(),
        size_bytes: row.get::<_, i64>(3)? as u64,
        created_at: from_millis(row.get(4)?),
    })
}

impl SnapshotStore {
    // ── Cleanup Actions ──────────────────────────────────────────

    /// Persist a new action and assign its id.
    pub fn record_action(&self, action: &mut CleanupAction) -> Result<ActionId> {
        let body = serde_json::to_string(&ActionBody::of(action))?;
        self.write(|conn| {
            conn.execute(
                "INSERT INTO cleanup_action \
                 (snapshot_id, created_at, state, executed, quarantine_mode, executed_at, undone_at, body) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    action.snapshot_id.0,
                    to_millis(action.created_at),
                    action.state.to_string(),
                    action.executed,
                    action.quarantine_mode,
                    action.executed_at.map(to_millis),
                    action.undone_at.map(to_millis),
                    body,
                ],
            )?;
            action.action_id = ActionId::new(conn.last_insert_rowid());
            debug!("Recorded {} action {}", action.mode.name(), action.action_id);
            Ok(action.action_id)
        })
    }

    /// Overwrite the mutable state of an existing action.
    pub fn update_action(&self, action: &CleanupAction) -> Result<()> {
        let body = serde_json::to_string(&ActionBody::of(action))?;
        self.write(|conn| {
            let changed = conn.execute(
                "UPDATE cleanup_action SET state = ?2, executed = ?3, quarantine_mode = ?4, \
                 executed_at = ?5, undone_at = ?6, body = ?7 WHERE id = ?1",
                params![
                    action.action_id.0,
                    action.state.to_string(),
                    action.executed,
                    action.quarantine_mode,
                    action.executed_at.map(to_millis),
                    action.undone_at.map(to_millis),
                    body,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::ActionNotFound(action.action_id));
            }
            debug!("Action {} is now {}", action.action_id, action.state);
            Ok(())
        })
    }

    pub fn get_action(&self, action_id: ActionId) -> Result<Option<CleanupAction>> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {ACTION_COLUMNS} FROM cleanup_action WHERE id = ?1"),
                    params![action_id.0],
                    ActionRow::from_row,
                )
                .optional()?)
        })?;
        row.map(ActionRow::into_action).transpose()
    }

    /// All actions, newest first.
    pub fn list_actions(&self) -> Result<Vec<CleanupAction>> {
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ACTION_COLUMNS} FROM cleanup_action ORDER BY id DESC"
            ))?;
            let rows = stmt
                .query_map([], ActionRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(ActionRow::into_action).collect()
    }

    /// Actions in `state`, oldest execution first.
    pub fn actions_in_state(&self, state: ActionState) -> Result<Vec<CleanupAction>> {
        let rows = self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {ACTION_COLUMNS} FROM cleanup_action WHERE state = ?1 \
                 ORDER BY executed_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map(params![state.to_string()], ActionRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(ActionRow::into_action).collect()
    }

    // ── Quarantine ───────────────────────────────────────────────

    pub fn insert_quarantine_entry(&self, entry: &QuarantineEntry) -> Result<()> {
        self.write(|conn| {
            conn.execute(
                "INSERT INTO quarantine_entry \
                 (action_id, original_path, quarantine_path, size_bytes, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    entry.action_id.0,
                    path_text(&entry.original_path),
                    path_text(&entry.quarantine_path),
                    entry.size_bytes as i64,
                    to_millis(entry.created_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Entries still held in quarantine for an action, ordered by original path.
    pub fn quarantine_entries(&self, action_id: ActionId) -> Result<Vec<QuarantineEntry>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT action_id, original_path, quarantine_path, size_bytes, created_at \
                 FROM quarantine_entry WHERE action_id = ?1 ORDER BY original_path ASC",
            )?;
            let rows = stmt
                .query_map(params![action_id.0], entry_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Forget an entry. Returns false if it was not present.
    pub fn remove_quarantine_entry(&self, action_id: ActionId, original_path: &Path) -> Result<bool> {
        self.write(|conn| {
            let removed = conn.execute(
                "DELETE FROM quarantine_entry WHERE action_id = ?1 AND original_path = ?2",
                params![action_id.0, path_text(original_path)],
            )?;
            Ok(removed > 0)
        })
    }
}
