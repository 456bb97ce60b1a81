//! Risk classification of deletion candidates.
//!
//! Classification is pure: it looks only at the cataloged record and the
//! compiled policy, never at the filesystem.
//!
//! Junk rules only see the part of a path below the scan root that covers
//! it, so a root that itself lives under `/tmp` does not make everything
//! inside it disposable.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use tidyvault_core::{FileRecord, RiskLevel};

use crate::error::{AnalyzeError, Result};

/// Top-level directories that hold the operating system or other
/// processes' state. Nothing under them is ever cleaned.
pub const DANGEROUS_ROOTS: &[&str] = &[
    "system", "vendor", "proc", "dev", "boot", "sys", "etc", "bin", "sbin", "usr", "lib",
    "lib32", "lib64", "System", "Library", "Windows", "Program Files",
];

/// Directory sequences protected wherever they appear in a path.
pub const PROTECTED_SEGMENTS: &[&str] = &["Android/data", "Android/obb", ".git", ".ssh", ".gnupg"];

/// Tunable classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// First path components that make a file high risk.
    pub dangerous_roots: Vec<String>,
    /// Component sequences that make a file high risk anywhere in its path.
    pub protected_segments: Vec<String>,
    /// Directory names whose contents are disposable (matched
    /// case-insensitively below the scan root).
    pub junk_dir_names: Vec<String>,
    /// Extensions of disposable files, lowercase without the dot.
    pub junk_extensions: Vec<String>,
    /// Glob patterns of disposable files, matched against the path relative
    /// to the scan root.
    pub junk_patterns: Vec<String>,
    /// Files modified this recently are never low risk.
    pub recent_days: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            dangerous_roots: DANGEROUS_ROOTS.iter().map(|s| s.to_string()).collect(),
            protected_segments: PROTECTED_SEGMENTS.iter().map(|s| s.to_string()).collect(),
            junk_dir_names: ["cache", ".cache", "caches", "tmp", ".tmp", "temp", "__pycache__", ".thumbnails"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            junk_extensions: ["tmp", "temp", "bak", "old", "log", "swp", "part", "crdownload", "dmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            junk_patterns: ["**/*~", "**/.DS_Store", "**/Thumbs.db", "**/desktop.ini"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recent_days: 30,
        }
    }
}

/// Rule that decided a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    Protected,
    Junk,
    RecentlyModified,
    Unclassified,
}

/// A [`RiskPolicy`] compiled against a reference time.
#[derive(Debug, Clone)]
pub struct RiskScorer {
    dangerous_roots: Vec<String>,
    protected_segments: Vec<Vec<String>>,
    junk_dir_names: Vec<String>,
    junk_extensions: Vec<String>,
    junk_patterns: GlobSet,
    recent_cutoff: DateTime<Utc>,
    roots: Vec<PathBuf>,
}

impl RiskScorer {
    /// Compile `policy`. Recency is measured back from `reference`.
    pub fn new(policy: &RiskPolicy, reference: DateTime<Utc>) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &policy.junk_patterns {
            let glob = Glob::new(pattern).map_err(|e| AnalyzeError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
            builder.add(glob);
        }
        let junk_patterns = builder.build().map_err(|e| AnalyzeError::InvalidPattern {
            pattern: policy.junk_patterns.join(", "),
            message: e.to_string(),
        })?;

        Ok(Self {
            dangerous_roots: policy.dangerous_roots.clone(),
            protected_segments: policy.protected_segments.iter().map(|s| split_segment(s)).collect(),
            junk_dir_names: policy.junk_dir_names.iter().map(|s| s.to_lowercase()).collect(),
            junk_extensions: policy
                .junk_extensions
                .iter()
                .map(|s| s.trim_start_matches('.').to_lowercase())
                .collect(),
            junk_patterns,
            recent_cutoff: reference - Duration::days(i64::from(policy.recent_days)),
            roots: Vec::new(),
        })
    }

    /// Restrict junk matching to the part of each path below one of `roots`.
    ///
    /// Without roots the whole path is matched.
    pub fn with_roots(mut self, roots: &[PathBuf]) -> Self {
        self.roots = roots.to_vec();
        self
    }

    /// Classify a record.
    pub fn classify(&self, record: &FileRecord) -> RiskLevel {
        self.assess(record).0
    }

    /// Classify a record and name the rule that decided it.
    ///
    /// Rules are tried in order: protected locations, disposable files,
    /// recent modification. Anything else is medium risk.
    pub fn assess(&self, record: &FileRecord) -> (RiskLevel, RiskReason) {
        let path = record.path.as_path();
        if dangerous_root(path, &self.dangerous_roots).is_some()
            || protected_segment(path, &self.protected_segments).is_some()
        {
            return (RiskLevel::High, RiskReason::Protected);
        }
        if self.is_junk(record) {
            return (RiskLevel::Low, RiskReason::Junk);
        }
        if record.mtime >= self.recent_cutoff {
            return (RiskLevel::Medium, RiskReason::RecentlyModified);
        }
        (RiskLevel::Medium, RiskReason::Unclassified)
    }

    /// Whether a record is disposable by extension, directory or pattern.
    pub fn is_junk(&self, record: &FileRecord) -> bool {
        if let Some(ext) = &record.extension {
            if self.junk_extensions.iter().any(|j| j == ext.as_str()) {
                return true;
            }
        }
        let Some(relative) = self.below_root(&record.path) else {
            return false;
        };
        let parent = relative.parent().unwrap_or(Path::new(""));
        let in_junk_dir = parent.components().any(|c| match c {
            Component::Normal(name) => {
                let name = name.to_string_lossy().to_lowercase();
                self.junk_dir_names.contains(&name)
            }
            _ => false,
        });
        in_junk_dir || self.junk_patterns.is_match(relative)
    }

    /// `path` relative to the deepest root containing it.
    fn below_root<'p>(&self, path: &'p Path) -> Option<&'p Path> {
        if self.roots.is_empty() {
            return Some(path);
        }
        self.roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|relative| relative.components().count())
    }
}

/// Split a protected segment like `Android/data` into components.
pub fn split_segment(segment: &str) -> Vec<String> {
    segment
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// The dangerous root a path lives under, judged by its first component.
pub fn dangerous_root<'a>(path: &Path, roots: &'a [String]) -> Option<&'a str> {
    let first = path.components().find_map(|c| match c {
        Component::Normal(name) => Some(name.to_string_lossy()),
        _ => None,
    })?;
    roots.iter().find(|r| **r == first).map(String::as_str)
}

/// The first protected segment that appears as consecutive components of `path`.
pub fn protected_segment<'a>(path: &Path, segments: &'a [Vec<String>]) -> Option<&'a [String]> {
    let names: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    segments
        .iter()
        .find(|segment| !segment.is_empty() && names.windows(segment.len()).any(|w| w == segment.as_slice()))
        .map(Vec::as_slice)
}
