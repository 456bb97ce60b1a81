use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use tidyvault_core::{roots_key, FileRecord, ScanOptions, Snapshot, SnapshotId};

use crate::convert::{from_millis, from_secs, path_text, to_millis};
use crate::error::{Result, StoreError};
use crate::sqlite::SnapshotStore;

const SNAPSHOT_COLUMNS: &str = "id, created_at, roots, follow_symlinks, include_hidden, \
                                file_count, total_bytes, complete";

pub(crate) const RECORD_COLUMNS: &str = "snapshot_id, path, size_bytes, mtime, extension";

/// Raw snapshot row; roots are decoded after the statement finishes.
struct SnapshotRow {
    id: i64,
    created_at: i64,
    roots: String,
    follow_symlinks: bool,
    include_hidden: bool,
    file_count: i64,
    total_bytes: i64,
    complete: bool,
}

impl SnapshotRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            roots: row.get(2)?,
            follow_symlinks: row.get(3)?,
            include_hidden: row.get(4)?,
            file_count: row.get(5)?,
            total_bytes: row.get(6)?,
            complete: row.get(7)?,
        })
    }

    fn into_snapshot(self) -> Result<Snapshot> {
        let roots: Vec<PathBuf> = serde_json::from_str(&self.roots)?;
        Ok(Snapshot {
            id: SnapshotId::new(self.id),
            created_at: from_millis(self.created_at),
            roots,
            options: ScanOptions {
                follow_symlinks: self.follow_symlinks,
                include_hidden: self.include_hidden,
            },
            file_count: self.file_count as u64,
            total_bytes: self.total_bytes as u64,
            complete: self.complete,
        })
    }
}

/// Map a row selected with [`RECORD_COLUMNS`].
pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let path: String = row.get(1)?;
    let extension: Option<String> = row.get(4)?;
    Ok(FileRecord {
        snapshot_id: SnapshotId::new(row.get(0)?),
        path: PathBuf::from(path),
        size_bytes: row.get::<_, i64>(2)? as u64,
        mtime: from_secs(row.get(3)?),
        extension: extension.map(Into::into),
    })
}

impl SnapshotStore {
    // ── Snapshots ────────────────────────────────────────────────

    /// Create an empty, non-finalized snapshot.
    pub fn create_snapshot(&self, roots: &[PathBuf], options: ScanOptions) -> Result<SnapshotId> {
        let roots_json = serde_json::to_string(roots)?;
        let key = roots_key(roots);
        let now = to_millis(Utc::now());

        self.write(|conn| {
            conn.execute(
                "INSERT INTO snapshot (created_at, roots, roots_key, follow_symlinks, include_hidden) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![now, roots_json, key, options.follow_symlinks, options.include_hidden],
            )?;
            let id = SnapshotId::new(conn.last_insert_rowid());
            debug!("Created snapshot {} for roots {:?}", id, roots);
            Ok(id)
        })
    }

    /// Append a batch of records to a snapshot that is still being written.
    ///
    /// Paths already present in the snapshot are ignored. Returns the number
    /// of rows inserted.
    pub fn insert_file_batch(&self, snapshot_id: SnapshotId, records: &[FileRecord]) -> Result<usize> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let complete: Option<bool> = tx
                .query_row(
                    "SELECT complete FROM snapshot WHERE id = ?1",
                    params![snapshot_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            match complete {
                None => return Err(StoreError::SnapshotNotFound(snapshot_id)),
                Some(true) => return Err(StoreError::SnapshotFinalized(snapshot_id)),
                Some(false) => {}
            }

            let mut count = 0;
            {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO file_record \
                     (snapshot_id, path, parent_dir, size_bytes, mtime, extension) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for record in records {
                    count += stmt.execute(params![
                        snapshot_id.0,
                        path_text(&record.path),
                        path_text(record.parent_dir()),
                        record.size_bytes as i64,
                        record.mtime.timestamp(),
                        record.extension.as_deref(),
                    ])?;
                }
            }
            tx.commit()?;
            debug!("Inserted {} records into snapshot {}", count, snapshot_id);
            Ok(count)
        })
    }

    /// Mark a snapshot complete, computing its totals from the stored rows.
    ///
    /// This is the only way a snapshot becomes complete.
    pub fn finalize_snapshot(&self, snapshot_id: SnapshotId) -> Result<Snapshot> {
        self.write(|conn| {
            let tx = conn.transaction()?;
            let complete: Option<bool> = tx
                .query_row(
                    "SELECT complete FROM snapshot WHERE id = ?1",
                    params![snapshot_id.0],
                    |row| row.get(0),
                )
                .optional()?;
            match complete {
                None => return Err(StoreError::SnapshotNotFound(snapshot_id)),
                Some(true) => return Err(StoreError::SnapshotFinalized(snapshot_id)),
                Some(false) => {}
            }

            tx.execute(
                "UPDATE snapshot SET complete = 1, \
                 file_count = (SELECT COUNT(*) FROM file_record WHERE snapshot_id = ?1), \
                 total_bytes = (SELECT COALESCE(SUM(size_bytes), 0) FROM file_record WHERE snapshot_id = ?1) \
                 WHERE id = ?1",
                params![snapshot_id.0],
            )?;
            let row = tx.query_row(
                &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshot WHERE id = ?1"),
                params![snapshot_id.0],
                SnapshotRow::from_row,
            )?;
            tx.commit()?;

            let snapshot = row.into_snapshot()?;
            info!(
                "Finalized snapshot {} ({} files, {} bytes)",
                snapshot.id, snapshot.file_count, snapshot.total_bytes
            );
            Ok(snapshot)
        })
    }

    /// Get a snapshot by id.
    ///
    /// Totals of a snapshot that is still being written reflect the rows
    /// inserted so far.
    pub fn get_snapshot(&self, snapshot_id: SnapshotId) -> Result<Option<Snapshot>> {
        let row = self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshot WHERE id = ?1"),
                    params![snapshot_id.0],
                    SnapshotRow::from_row,
                )
                .optional()?)
        })?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut snapshot = row.into_snapshot()?;
        if !snapshot.complete {
            let (count, bytes) = self.read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM file_record WHERE snapshot_id = ?1",
                    params![snapshot_id.0],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
                )?)
            })?;
            snapshot.file_count = count as u64;
            snapshot.total_bytes = bytes as u64;
        }
        Ok(Some(snapshot))
    }

    /// Get the newest finalized snapshot, optionally restricted to a root set.
    pub fn latest_snapshot(&self, roots: Option<&[PathBuf]>) -> Result<Option<Snapshot>> {
        let row = self.read(|conn| {
            let row = match roots {
                Some(roots) => conn
                    .query_row(
                        &format!(
                            "SELECT {SNAPSHOT_COLUMNS} FROM snapshot \
                             WHERE complete = 1 AND roots_key = ?1 ORDER BY id DESC LIMIT 1"
                        ),
                        params![roots_key(roots)],
                        SnapshotRow::from_row,
                    )
                    .optional()?,
                None => conn
                    .query_row(
                        &format!(
                            "SELECT {SNAPSHOT_COLUMNS} FROM snapshot \
                             WHERE complete = 1 ORDER BY id DESC LIMIT 1"
                        ),
                        [],
                        SnapshotRow::from_row,
                    )
                    .optional()?,
            };
            Ok(row)
        })?;
        row.map(SnapshotRow::into_snapshot).transpose()
    }

    /// List all snapshots, newest first.
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let rows = self.read(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshot ORDER BY id DESC"))?;
            let rows = stmt
                .query_map([], SnapshotRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;
        rows.into_iter().map(SnapshotRow::into_snapshot).collect()
    }

    // ── File Records ─────────────────────────────────────────────

    /// Look up a single record by its canonical path.
    pub fn get_file(&self, snapshot_id: SnapshotId, path: &Path) -> Result<Option<FileRecord>> {
        self.read(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM file_record WHERE snapshot_id = ?1 AND path = ?2"
                    ),
                    params![snapshot_id.0, path_text(path)],
                    record_from_row,
                )
                .optional()?)
        })
    }
}
