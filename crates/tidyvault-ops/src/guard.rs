//! Path validation for cleanup candidates.

use std::path::{Component, Path, PathBuf};

use tidyvault_analyze::risk::{
    dangerous_root, protected_segment, split_segment, DANGEROUS_ROOTS, PROTECTED_SEGMENTS,
};
use tidyvault_core::RejectReason;

/// Resolve `path` to the form it is compared in.
///
/// Existing paths are canonicalized. For a path that no longer exists, the
/// deepest existing ancestor is canonicalized and the rest is appended with
/// `.` and `..` resolved lexically.
pub fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let path = lexical(path);
    let mut missing = Vec::new();
    let mut current = path.as_path();
    while let Some(parent) = current.parent() {
        if let Some(name) = current.file_name() {
            missing.push(name);
        }
        if let Ok(mut base) = parent.canonicalize() {
            base.extend(missing.iter().rev().copied());
            return base;
        }
        current = parent;
    }
    path
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decides whether a candidate may be cleaned at all.
///
/// The denied locations are fixed: the built-in dangerous roots and
/// protected segments, plus the quarantine itself. A [`RiskPolicy`] can mark
/// further locations high risk, but those can be forced; these cannot.
///
/// [`RiskPolicy`]: tidyvault_analyze::RiskPolicy
#[derive(Debug, Clone)]
pub struct PathGuard {
    dangerous_roots: Vec<String>,
    protected_segments: Vec<Vec<String>>,
    quarantine_dir: PathBuf,
}

impl PathGuard {
    pub fn new(quarantine_dir: &Path) -> Self {
        Self {
            dangerous_roots: DANGEROUS_ROOTS.iter().map(|s| s.to_string()).collect(),
            protected_segments: PROTECTED_SEGMENTS.iter().map(|s| split_segment(s)).collect(),
            quarantine_dir: normalize(quarantine_dir),
        }
    }

    /// The normalized quarantine directory.
    pub fn quarantine_dir(&self) -> &Path {
        &self.quarantine_dir
    }

    /// Check an already normalized path against the normalized `roots`.
    pub fn check(&self, path: &Path, roots: &[PathBuf]) -> Result<(), RejectReason> {
        if let Some(segment) = dangerous_root(path, &self.dangerous_roots) {
            return Err(RejectReason::DangerousRoot {
                segment: segment.to_string(),
            });
        }
        if let Some(segment) = protected_segment(path, &self.protected_segments) {
            return Err(RejectReason::ProtectedPath {
                rule: segment.join("/"),
            });
        }
        if path.starts_with(&self.quarantine_dir) {
            return Err(RejectReason::ProtectedPath {
                rule: self.quarantine_dir.display().to_string(),
            });
        }
        if !roots.iter().any(|root| path.starts_with(root)) {
            return Err(RejectReason::OutsideRoots);
        }
        Ok(())
    }

    /// The first root that contains the quarantine directory or lies inside it.
    pub fn overlapping_root<'a>(&self, roots: &'a [PathBuf]) -> Option<&'a PathBuf> {
        roots
            .iter()
            .find(|root| self.quarantine_dir.starts_with(root) || root.starts_with(&self.quarantine_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard(quarantine: &Path) -> PathGuard {
        PathGuard::new(quarantine)
    }

    #[test]
    fn test_normalize_existing_path_is_canonical() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("a");
        std::fs::create_dir(&dir).unwrap();

        let normalized = normalize(&dir.join("..").join("a"));
        assert_eq!(normalized, dir.canonicalize().unwrap());
    }

    #[test]
    fn test_normalize_missing_path_keeps_canonical_parent() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("gone").join("..").join("x").join("file.txt");

        let normalized = normalize(&missing);
        assert_eq!(
            normalized,
            temp.path().canonicalize().unwrap().join("x").join("file.txt")
        );
    }

    #[test]
    fn test_normalize_system_path() {
        assert_eq!(normalize(Path::new("/system/app/./foo")), PathBuf::from("/system/app/foo"));
    }

    #[test]
    fn test_rejection_order() {
        let guard = guard(Path::new("/srv/quarantine"));
        let roots = vec![PathBuf::from("/srv"), PathBuf::from("/home/u")];

        assert_eq!(
            guard.check(Path::new("/system/app/foo"), &roots),
            Err(RejectReason::DangerousRoot {
                segment: "system".to_string()
            })
        );
        assert_eq!(
            guard.check(Path::new("/home/u/repo/.git/config"), &roots),
            Err(RejectReason::ProtectedPath {
                rule: ".git".to_string()
            })
        );
        assert!(matches!(
            guard.check(Path::new("/srv/quarantine/action-1/a"), &roots),
            Err(RejectReason::ProtectedPath { .. })
        ));
        assert_eq!(
            guard.check(Path::new("/mnt/other/a"), &roots),
            Err(RejectReason::OutsideRoots)
        );
        assert_eq!(guard.check(Path::new("/home/u/old.iso"), &roots), Ok(()));
    }

    #[test]
    fn test_roots_are_component_wise() {
        let guard = guard(Path::new("/q"));
        let roots = vec![PathBuf::from("/home/u/Downloads")];
        assert_eq!(
            guard.check(Path::new("/home/u/Downloads2/a"), &roots),
            Err(RejectReason::OutsideRoots)
        );
    }

    #[test]
    fn test_overlapping_root() {
        let guard = guard(Path::new("/data/q"));
        assert!(guard.overlapping_root(&[PathBuf::from("/data")]).is_some());
        assert!(guard.overlapping_root(&[PathBuf::from("/data/q/inner")]).is_some());
        assert!(guard.overlapping_root(&[PathBuf::from("/home")]).is_none());
    }
}
