//! Explicit-stack directory walk.

use std::collections::{HashSet, VecDeque};
use std::fs::{self, DirEntry, Metadata};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tidyvault_core::{FileRecord, ScanOptions, SkippedDirectory, SnapshotId};

use crate::inode::{inode_of, InodeTracker};

/// One observation made by a [`Walker`].
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    /// A regular file to catalog.
    File(FileRecord),
    /// A directory that could not be read. The walk continues.
    DirectorySkipped(SkippedDirectory),
}

/// Iterator over the files under a set of canonical roots.
///
/// Directories are read one at a time from an explicit stack, so depth is
/// bounded by memory rather than by the call stack. Entries of a directory
/// are visited in name order.
pub struct Walker {
    snapshot_id: SnapshotId,
    options: ScanOptions,
    stack: Vec<PathBuf>,
    pending: VecDeque<WalkEvent>,
    visited: InodeTracker,
    /// Files already emitted; links can reach a file more than once.
    emitted: HashSet<PathBuf>,
    dirs_read: u64,
}

impl Walker {
    /// Walk `roots`, which must already be canonical directories.
    pub fn new(snapshot_id: SnapshotId, roots: &[PathBuf], options: ScanOptions) -> Self {
        let visited = InodeTracker::new();
        let mut stack = Vec::with_capacity(roots.len());
        for root in roots.iter().rev() {
            if options.follow_symlinks {
                if let Some(info) = fs::metadata(root).ok().as_ref().and_then(inode_of) {
                    if !visited.enter(info) {
                        continue;
                    }
                }
            }
            stack.push(root.clone());
        }

        Self {
            snapshot_id,
            options,
            stack,
            pending: VecDeque::new(),
            visited,
            emitted: HashSet::new(),
            dirs_read: 0,
        }
    }

    /// Number of directories listed so far.
    pub fn dirs_read(&self) -> u64 {
        self.dirs_read
    }

    fn read_dir(&mut self, dir: &Path) {
        let listing = match fs::read_dir(dir) {
            Ok(listing) => listing,
            Err(err) => {
                warn!("Skipping unreadable directory {}: {}", dir.display(), err);
                self.pending
                    .push_back(WalkEvent::DirectorySkipped(SkippedDirectory::from_io(dir, &err)));
                return;
            }
        };
        self.dirs_read += 1;

        let mut entries: Vec<DirEntry> = Vec::new();
        for entry in listing {
            match entry {
                Ok(entry) => entries.push(entry),
                Err(err) => debug!("Unreadable entry in {}: {}", dir.display(), err),
            }
        }
        entries.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if self.options.should_skip_hidden(&name.to_string_lossy()) {
                continue;
            }
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    debug!("No file type for {}: {}", path.display(), err);
                    continue;
                }
            };

            if file_type.is_symlink() {
                if !self.options.follow_symlinks {
                    continue;
                }
                self.visit_link(path, &mut subdirs);
            } else if file_type.is_dir() {
                if self.options.follow_symlinks {
                    match entry.metadata().ok().as_ref().and_then(inode_of) {
                        Some(info) if !self.visited.enter(info) => {
                            self.pending
                                .push_back(WalkEvent::DirectorySkipped(SkippedDirectory::cycle(path)));
                            continue;
                        }
                        _ => {}
                    }
                }
                subdirs.push(path);
            } else if file_type.is_file() {
                match entry.metadata() {
                    Ok(metadata) => self.emit_file(path, &metadata),
                    Err(err) => debug!("No metadata for {}: {}", path.display(), err),
                }
            }
        }

        // Reverse so the stack pops subdirectories in name order
        self.stack.extend(subdirs.into_iter().rev());
    }

    fn visit_link(&mut self, link: PathBuf, subdirs: &mut Vec<PathBuf>) {
        let (target, metadata) = match fs::canonicalize(&link).and_then(|t| {
            let metadata = fs::metadata(&t)?;
            Ok((t, metadata))
        }) {
            Ok(resolved) => resolved,
            Err(err) => {
                debug!("Dangling link {}: {}", link.display(), err);
                return;
            }
        };

        if metadata.is_dir() {
            match inode_of(&metadata) {
                Some(info) if !self.visited.enter(info) => {
                    self.pending
                        .push_back(WalkEvent::DirectorySkipped(SkippedDirectory::cycle(link)));
                }
                _ => subdirs.push(target),
            }
        } else if metadata.is_file() {
            self.emit_file(target, &metadata);
        }
    }

    fn emit_file(&mut self, path: PathBuf, metadata: &Metadata) {
        if self.options.follow_symlinks && !self.emitted.insert(path.clone()) {
            return;
        }
        let mtime: DateTime<Utc> = metadata.modified().unwrap_or(UNIX_EPOCH).into();
        self.pending.push_back(WalkEvent::File(FileRecord::new(
            self.snapshot_id,
            path,
            metadata.len(),
            mtime,
        )));
    }
}

impl Iterator for Walker {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            let dir = self.stack.pop()?;
            self.read_dir(&dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn files(walker: Walker) -> Vec<PathBuf> {
        walker
            .filter_map(|e| match e {
                WalkEvent::File(r) => Some(r.path),
                WalkEvent::DirectorySkipped(_) => None,
            })
            .collect()
    }

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("b/deep")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::write(root.join("b/deep/c.txt"), "ccc").unwrap();
        fs::write(root.join(".hidden/secret"), "s").unwrap();
        fs::write(root.join(".dotfile"), "d").unwrap();
        temp
    }

    #[test]
    fn test_walk_order_and_hidden() {
        let temp = tree();
        let root = temp.path().canonicalize().unwrap();
        let walker = Walker::new(SnapshotId::new(1), &[root.clone()], ScanOptions::default());

        assert_eq!(files(walker), vec![root.join("a.txt"), root.join("b/deep/c.txt")]);
    }

    #[test]
    fn test_include_hidden() {
        let temp = tree();
        let root = temp.path().canonicalize().unwrap();
        let options = ScanOptions {
            include_hidden: true,
            ..Default::default()
        };
        let found = files(Walker::new(SnapshotId::new(1), &[root.clone()], options));

        assert_eq!(found.len(), 4);
        assert!(found.contains(&root.join(".hidden/secret")));
    }

    #[test]
    fn test_records_carry_size() {
        let temp = tree();
        let root = temp.path().canonicalize().unwrap();
        let records: Vec<FileRecord> = Walker::new(SnapshotId::new(9), &[root], ScanOptions::default())
            .filter_map(|e| match e {
                WalkEvent::File(r) => Some(r),
                _ => None,
            })
            .collect();

        assert_eq!(records[1].size_bytes, 3);
        assert_eq!(records[1].snapshot_id, SnapshotId::new(9));
        assert_eq!(records[0].extension.as_deref(), Some("txt"));
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("gone");
        let events: Vec<_> = Walker::new(SnapshotId::new(1), &[gone], ScanOptions::default()).collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WalkEvent::DirectorySkipped(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_ignored_unless_followed() {
        let temp = tree();
        let root = temp.path().canonicalize().unwrap();
        std::os::unix::fs::symlink(root.join("b"), root.join("link-to-b")).unwrap();
        std::os::unix::fs::symlink(root.join("a.txt"), root.join("link-to-a")).unwrap();

        let plain = files(Walker::new(SnapshotId::new(1), &[root.clone()], ScanOptions::default()));
        assert_eq!(plain.len(), 2);

        let options = ScanOptions {
            follow_symlinks: true,
            ..Default::default()
        };
        let followed = files(Walker::new(SnapshotId::new(1), &[root.clone()], options));
        // Linked file resolves to its canonical path; linked dir was already entered
        assert!(followed.iter().all(|p| !p.starts_with(root.join("link-to-b"))));
        assert_eq!(followed, vec![root.join("a.txt"), root.join("b/deep/c.txt")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_terminates() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().canonicalize().unwrap();
        fs::create_dir(root.join("loop")).unwrap();
        fs::write(root.join("loop/file"), "x").unwrap();
        std::os::unix::fs::symlink(&root, root.join("loop/back")).unwrap();

        let options = ScanOptions {
            follow_symlinks: true,
            ..Default::default()
        };
        let events: Vec<_> = Walker::new(SnapshotId::new(1), &[root.clone()], options).collect();

        let skipped = events
            .iter()
            .filter(|e| matches!(e, WalkEvent::DirectorySkipped(s) if s.reason == tidyvault_core::SkipReason::SymlinkCycle))
            .count();
        assert_eq!(skipped, 1);
        assert_eq!(
            events.iter().filter(|e| matches!(e, WalkEvent::File(_))).count(),
            1
        );
    }
}
