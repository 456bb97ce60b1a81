//! Holding area for files removed by a cleanup action.
//!
//! Each action owns `<dir>/action-<id>/`. Files keep their names; a name
//! already taken inside the action directory gets a ` (n)` suffix, the
//! smallest free `n`, so the layout depends only on the order files arrive.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use tidyvault_core::{ActionId, QuarantineEntry};

#[derive(Debug, Clone)]
pub struct Quarantine {
    dir: PathBuf,
}

impl Quarantine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Directory holding the files of one action.
    pub fn action_dir(&self, action_id: ActionId) -> PathBuf {
        self.dir.join(format!("action-{action_id}"))
    }

    /// Move `original` into the action's directory and return its new path.
    pub fn admit(&self, action_id: ActionId, original: &Path) -> io::Result<PathBuf> {
        let name = original.file_name().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "path has no file name")
        })?;
        let dir = self.action_dir(action_id);
        fs::create_dir_all(&dir)?;

        let destination = free_path(&dir.join(name));
        relocate(original, &destination)?;
        debug!("Quarantined {} as {}", original.display(), destination.display());
        Ok(destination)
    }

    /// Move a quarantined file back to its original path.
    ///
    /// Missing parent directories are recreated. An existing file at the
    /// original path is never overwritten.
    pub fn restore(&self, entry: &QuarantineEntry) -> io::Result<()> {
        if occupied(&entry.original_path) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "original path is occupied",
            ));
        }
        if let Some(parent) = entry.original_path.parent() {
            fs::create_dir_all(parent)?;
        }
        relocate(&entry.quarantine_path, &entry.original_path)?;
        debug!("Restored {}", entry.original_path.display());
        Ok(())
    }

    /// Permanently delete a quarantined file. A file that is already gone
    /// counts as deleted.
    pub fn purge(&self, entry: &QuarantineEntry) -> io::Result<()> {
        match fs::remove_file(&entry.quarantine_path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove the action's directory once it is empty.
    pub fn release(&self, action_id: ActionId) {
        // Non-empty directories stay; their files still have entries
        let _ = fs::remove_dir(self.action_dir(action_id));
    }
}

fn occupied(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// The first of `path`, `stem (1).ext`, `stem (2).ext`, ... that is free.
pub fn free_path(path: &Path) -> PathBuf {
    if !occupied(path) {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or(Path::new(""));
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy());

    (1u64..)
        .map(|i| {
            let name = match &extension {
                Some(ext) => format!("{stem} ({i}).{ext}"),
                None => format!("{stem} ({i})"),
            };
            parent.join(name)
        })
        .find(|candidate| !occupied(candidate))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Move a file, copying across filesystems.
///
/// The copy keeps the source's modification time. If the source cannot be
/// removed afterwards the copy is deleted again and the error returned.
pub fn relocate(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::rename(source, destination) {
        Ok(()) => return Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(
                "{} is on another device, copying instead of renaming",
                source.display()
            );
        }
        Err(e) => return Err(e),
    }

    let modified = fs::metadata(source)?.modified().ok();
    fs::copy(source, destination)?;
    if let Some(modified) = modified {
        File::options()
            .write(true)
            .open(destination)
            .and_then(|file| file.set_modified(modified))?;
    }
    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(original: PathBuf, quarantine_path: PathBuf) -> QuarantineEntry {
        QuarantineEntry {
            action_id: ActionId::new(1),
            original_path: original,
            quarantine_path,
            size_bytes: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_path_suffixes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("photo.jpg");
        assert_eq!(free_path(&path), path);

        fs::write(&path, b"a").unwrap();
        assert_eq!(free_path(&path), temp.path().join("photo (1).jpg"));

        fs::write(temp.path().join("photo (1).jpg"), b"b").unwrap();
        assert_eq!(free_path(&path), temp.path().join("photo (2).jpg"));
    }

    #[test]
    fn test_free_path_without_extension() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("Makefile");
        fs::write(&path, b"all:").unwrap();
        assert_eq!(free_path(&path), temp.path().join("Makefile (1)"));
    }

    #[test]
    fn test_admit_same_name_twice() {
        let temp = TempDir::new().unwrap();
        let quarantine = Quarantine::new(temp.path().join("q"));
        fs::create_dir_all(temp.path().join("a")).unwrap();
        fs::create_dir_all(temp.path().join("b")).unwrap();
        fs::write(temp.path().join("a/x.txt"), b"1").unwrap();
        fs::write(temp.path().join("b/x.txt"), b"2").unwrap();

        let id = ActionId::new(7);
        let first = quarantine.admit(id, &temp.path().join("a/x.txt")).unwrap();
        let second = quarantine.admit(id, &temp.path().join("b/x.txt")).unwrap();

        assert_eq!(first, quarantine.action_dir(id).join("x.txt"));
        assert_eq!(second, quarantine.action_dir(id).join("x (1).txt"));
        assert_eq!(fs::read(&second).unwrap(), b"2");
        assert!(!temp.path().join("b/x.txt").exists());
    }

    #[test]
    fn test_restore_recreates_parents() {
        let temp = TempDir::new().unwrap();
        let quarantine = Quarantine::new(temp.path().join("q"));
        let original = temp.path().join("deep/dir/file.bin");
        fs::create_dir_all(original.parent().unwrap()).unwrap();
        fs::write(&original, b"data").unwrap();

        let held = quarantine.admit(ActionId::new(1), &original).unwrap();
        fs::remove_dir_all(temp.path().join("deep")).unwrap();

        quarantine.restore(&entry(original.clone(), held.clone())).unwrap();
        assert_eq!(fs::read(&original).unwrap(), b"data");
        assert!(!held.exists());
    }

    #[test]
    fn test_restore_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let quarantine = Quarantine::new(temp.path().join("q"));
        let original = temp.path().join("file.txt");
        fs::write(&original, b"old").unwrap();

        let held = quarantine.admit(ActionId::new(1), &original).unwrap();
        fs::write(&original, b"new").unwrap();

        let err = quarantine.restore(&entry(original.clone(), held.clone())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read(&original).unwrap(), b"new");
        assert!(held.exists());
    }

    #[test]
    fn test_purge_tolerates_missing_file() {
        let temp = TempDir::new().unwrap();
        let quarantine = Quarantine::new(temp.path().join("q"));
        let entry = entry(temp.path().join("a"), temp.path().join("q/action-1/a"));
        quarantine.purge(&entry).unwrap();
    }
}
