use rusqlite::types::Value;
use rusqlite::{params, params_from_iter};
use tracing::debug;

use tidyvault_core::{FileRecord, SnapshotId};

use crate::convert::path_text;
use crate::error::Result;
use crate::models::{
    DirectoryTotal, ExtensionCount, FileFilter, HistogramBucket, ParetoPoint, SnapshotDelta,
    HISTOGRAM_BUCKETS,
};
use crate::snapshots::{record_from_row, RECORD_COLUMNS};
use crate::sqlite::SnapshotStore;

impl SnapshotStore {
    // ── Usage Aggregates ─────────────────────────────────────────

    /// The `limit` largest files, ties broken by path.
    pub fn largest_files(&self, snapshot_id: SnapshotId, limit: usize) -> Result<Vec<FileRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM file_record WHERE snapshot_id = ?1 \
                 ORDER BY size_bytes DESC, path ASC LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![snapshot_id.0, limit as i64], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Bytes held directly by each directory that contains files.
    pub fn directory_totals(&self, snapshot_id: SnapshotId) -> Result<Vec<DirectoryTotal>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT parent_dir, SUM(size_bytes), COUNT(*) FROM file_record \
                 WHERE snapshot_id = ?1 GROUP BY parent_dir",
            )?;
            let rows = stmt
                .query_map(params![snapshot_id.0], |row| {
                    let path: String = row.get(0)?;
                    Ok(DirectoryTotal {
                        path: path.into(),
                        bytes: row.get::<_, i64>(1)? as u64,
                        file_count: row.get::<_, i64>(2)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!("Snapshot {} spans {} directories", snapshot_id, rows.len());
            Ok(rows)
        })
    }

    /// Per-extension totals, largest first.
    pub fn extension_counts(&self, snapshot_id: SnapshotId) -> Result<Vec<ExtensionCount>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT extension, COUNT(*), SUM(size_bytes) FROM file_record \
                 WHERE snapshot_id = ?1 GROUP BY extension \
                 ORDER BY SUM(size_bytes) DESC, extension ASC",
            )?;
            let rows = stmt
                .query_map(params![snapshot_id.0], |row| {
                    Ok(ExtensionCount {
                        extension: row.get(0)?,
                        file_count: row.get::<_, i64>(1)? as u64,
                        total_bytes: row.get::<_, i64>(2)? as u64,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Cumulative size curve sampled at roughly `points` positions.
    ///
    /// The curve starts at the origin and always ends at (100, 100) for a
    /// non-empty snapshot.
    pub fn size_pareto(&self, snapshot_id: SnapshotId, points: usize) -> Result<Vec<ParetoPoint>> {
        if points == 0 {
            return Ok(Vec::new());
        }

        self.read(|conn| {
            let (count, total): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM file_record WHERE snapshot_id = ?1",
                params![snapshot_id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if count == 0 {
                return Ok(Vec::new());
            }
            let step = (count as usize).div_ceil(points).max(1) as i64;

            let mut stmt = conn.prepare_cached(
                "SELECT rn, cum_bytes FROM ( \
                     SELECT ROW_NUMBER() OVER w AS rn, \
                            SUM(size_bytes) OVER (w ROWS UNBOUNDED PRECEDING) AS cum_bytes \
                     FROM file_record WHERE snapshot_id = ?1 \
                     WINDOW w AS (ORDER BY size_bytes DESC, path ASC) \
                 ) WHERE rn % ?2 = 0 OR rn = ?3 ORDER BY rn",
            )?;
            let mut curve = vec![ParetoPoint {
                files_pct: 0.0,
                bytes_pct: 0.0,
            }];
            let samples = stmt
                .query_map(params![snapshot_id.0, step, count], |row| {
                    let rn: i64 = row.get(0)?;
                    let cum: i64 = row.get(1)?;
                    Ok(ParetoPoint {
                        files_pct: rn as f64 * 100.0 / count as f64,
                        bytes_pct: if total == 0 {
                            100.0
                        } else {
                            cum as f64 * 100.0 / total as f64
                        },
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            curve.extend(samples);
            Ok(curve)
        })
    }

    /// Log-scale size histogram; every bucket is returned, empty or not.
    pub fn size_histogram(&self, snapshot_id: SnapshotId) -> Result<Vec<HistogramBucket>> {
        let sql = format!(
            "SELECT {} AS bucket, COUNT(*), SUM(size_bytes) FROM file_record \
             WHERE snapshot_id = ?1 GROUP BY bucket",
            bucket_case_sql()
        );

        self.read(|conn| {
            let mut buckets: Vec<HistogramBucket> = (0..HISTOGRAM_BUCKETS as u8)
                .map(HistogramBucket::empty)
                .collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![snapshot_id.0], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for (index, count, bytes) in rows {
                if let Some(bucket) = buckets.get_mut(index as usize) {
                    bucket.file_count = count as u64;
                    bucket.total_bytes = bytes as u64;
                }
            }
            Ok(buckets)
        })
    }

    /// Added, removed and changed files going from `base` to `current`.
    pub fn snapshot_delta(&self, base: SnapshotId, current: SnapshotId) -> Result<SnapshotDelta> {
        self.read(|conn| {
            let (added_files, added_bytes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(c.size_bytes), 0) FROM file_record c \
                 WHERE c.snapshot_id = ?2 AND NOT EXISTS \
                 (SELECT 1 FROM file_record b WHERE b.snapshot_id = ?1 AND b.path = c.path)",
                params![base.0, current.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (removed_files, removed_bytes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(b.size_bytes), 0) FROM file_record b \
                 WHERE b.snapshot_id = ?1 AND NOT EXISTS \
                 (SELECT 1 FROM file_record c WHERE c.snapshot_id = ?2 AND c.path = b.path)",
                params![base.0, current.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            let (changed_files, changed_bytes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(c.size_bytes - b.size_bytes), 0) \
                 FROM file_record c JOIN file_record b \
                 ON b.snapshot_id = ?1 AND b.path = c.path \
                 WHERE c.snapshot_id = ?2 \
                 AND (c.size_bytes <> b.size_bytes OR c.mtime <> b.mtime)",
                params![base.0, current.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            Ok(SnapshotDelta {
                added_files: added_files as u64,
                added_bytes: added_bytes as u64,
                removed_files: removed_files as u64,
                removed_bytes: removed_bytes as u64,
                changed_files: changed_files as u64,
                changed_bytes,
                net_bytes: added_bytes - removed_bytes + changed_bytes,
            })
        })
    }

    // ── Selection ────────────────────────────────────────────────

    /// Records matching `filter`, ordered by path.
    pub fn files_matching(&self, snapshot_id: SnapshotId, filter: &FileFilter) -> Result<Vec<FileRecord>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM file_record WHERE snapshot_id = ?");
        let mut values: Vec<Value> = vec![Value::Integer(snapshot_id.0)];

        if let Some(min_size) = filter.min_size {
            sql.push_str(" AND size_bytes >= ?");
            values.push(Value::Integer(min_size as i64));
        }
        if let Some(cutoff) = filter.modified_before {
            sql.push_str(" AND mtime < ?");
            values.push(Value::Integer(cutoff.timestamp()));
        }

        sql.push_str(" ORDER BY path ASC");

        self.read(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!("Filter matched {} files in snapshot {}", rows.len(), snapshot_id);
            Ok(rows)
        })
    }

    /// Visit every record of a snapshot in path order without collecting them.
    pub fn for_each_file(&self, snapshot_id: SnapshotId, mut visit: impl FnMut(FileRecord)) -> Result<()> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM file_record WHERE snapshot_id = ?1 ORDER BY path ASC"
            ))?;
            for record in stmt.query_map(params![snapshot_id.0], record_from_row)? {
                visit(record?);
            }
            Ok(())
        })
    }

    /// Records whose size is shared with at least one other record.
    ///
    /// Sizes below `min_size` (and always zero) are excluded. Ordered by size
    /// descending, then path.
    pub fn duplicate_size_candidates(&self, snapshot_id: SnapshotId, min_size: u64) -> Result<Vec<FileRecord>> {
        let min_size = min_size.max(1) as i64;
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM file_record \
                 WHERE snapshot_id = ?1 AND size_bytes >= ?2 AND size_bytes IN ( \
                     SELECT size_bytes FROM file_record \
                     WHERE snapshot_id = ?1 AND size_bytes >= ?2 \
                     GROUP BY size_bytes HAVING COUNT(*) > 1 \
                 ) ORDER BY size_bytes DESC, path ASC"
            ))?;
            let rows = stmt
                .query_map(params![snapshot_id.0, min_size], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            debug!(
                "{} files share a size with another file in snapshot {}",
                rows.len(),
                snapshot_id
            );
            Ok(rows)
        })
    }

    /// Every record of a snapshot, ordered by path.
    pub fn all_files(&self, snapshot_id: SnapshotId) -> Result<Vec<FileRecord>> {
        self.files_matching(snapshot_id, &FileFilter::default())
    }

    /// Records for the given paths that exist in the snapshot.
    pub fn files_at(&self, snapshot_id: SnapshotId, paths: &[std::path::PathBuf]) -> Result<Vec<FileRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {RECORD_COLUMNS} FROM file_record WHERE snapshot_id = ?1 AND path = ?2"
            ))?;
            let mut found = Vec::new();
            for path in paths {
                let mut rows = stmt.query_map(params![snapshot_id.0, path_text(path)], record_from_row)?;
                if let Some(record) = rows.next() {
                    found.push(record?);
                }
            }
            Ok(found)
        })
    }
}

/// CASE expression mapping `size_bytes` to its histogram bucket index.
fn bucket_case_sql() -> String {
    let mut sql = String::from("CASE WHEN size_bytes = 0 THEN 0");
    for decade in 1..HISTOGRAM_BUCKETS - 1 {
        sql.push_str(&format!(
            " WHEN size_bytes < {} THEN {decade}",
            10i64.pow(decade as u32)
        ));
    }
    sql.push_str(&format!(" ELSE {} END", HISTOGRAM_BUCKETS - 1));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_case_covers_all_buckets() {
        let sql = bucket_case_sql();
        assert!(sql.starts_with("CASE WHEN size_bytes = 0 THEN 0"));
        assert!(sql.contains("WHEN size_bytes < 10 THEN 1"));
        assert!(sql.contains("WHEN size_bytes < 1000000000000000 THEN 15"));
        assert!(sql.ends_with("ELSE 16 END"));
    }
}
