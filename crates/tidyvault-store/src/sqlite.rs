use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::{Result, StoreError};

const SCHEMA_VERSION: i64 = 1;

/// Durable catalog of snapshots, file records and cleanup actions.
///
/// Writes go through a single writer connection, one transaction per call.
/// File-backed catalogs also hold a read-only connection so analytics over a
/// finalized snapshot do not queue behind an in-progress scan's batches.
pub struct SnapshotStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SnapshotStore {
    /// Open (or create) a catalog file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let writer = Connection::open(path)?;
        configure_pragmas(&writer)?;
        migrate_schema(&writer)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA query_only = ON;")?;

        debug!("Opened catalog at {}", path.display());
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory catalog.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        configure_pragmas(&writer)?;
        migrate_schema(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: None,
            path: None,
        })
    }

    /// Location of the catalog file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn write<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = lock(&self.writer)?;
        f(&mut conn)
    }

    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = match &self.reader {
            Some(reader) => lock(reader)?,
            None => lock(&self.writer)?,
        };
        f(&conn)
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| StoreError::LockPoisoned)
}

fn configure_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA cache_size = -64000;
         PRAGMA busy_timeout = 5000;",
    )?;
    debug!("SQLite pragmas configured (WAL mode, 64MB cache)");
    Ok(())
}

/// Create the schema on first open.
fn migrate_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < SCHEMA_VERSION {
        conn.execute_batch(include_str!("schema.sql"))?;
        conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        debug!("Catalog schema initialized (version {})", SCHEMA_VERSION);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let store = SnapshotStore::open_in_memory().unwrap();
        let tables: i64 = store
            .read(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' \
                     AND name IN ('snapshot', 'file_record', 'cleanup_action', 'quarantine_entry')",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 4);
        assert!(store.path().is_none());
    }

    #[test]
    fn test_file_catalog_uses_wal() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/catalog.db");
        let store = SnapshotStore::open(&path).unwrap();

        let mode: String = store
            .write(|conn| Ok(conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn test_reopen_keeps_schema_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("catalog.db");
        drop(SnapshotStore::open(&path).unwrap());

        let store = SnapshotStore::open(&path).unwrap();
        let version: i64 = store
            .read(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
