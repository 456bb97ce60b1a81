//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::snapshot::ScanOptions;

/// Default number of records buffered before a catalog flush.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Configuration for a scan.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Absolute roots to scan.
    pub roots: Vec<PathBuf>,

    /// Follow symbolic links.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Include hidden files and directories (starting with .).
    #[builder(default = "false")]
    #[serde(default)]
    pub include_hidden: bool,

    /// Records buffered per catalog batch.
    #[builder(default = "DEFAULT_BATCH_SIZE")]
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.roots {
            Some(ref roots) if roots.is_empty() => {
                return Err("At least one root is required".to_string());
            }
            Some(ref roots) => {
                if roots.iter().any(|r| r.as_os_str().is_empty()) {
                    return Err("Root path cannot be empty".to_string());
                }
            }
            None => return Err("Roots are required".to_string()),
        }
        if self.batch_size == Some(0) {
            return Err("Batch size must be positive".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning some roots.
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
            follow_symlinks: false,
            include_hidden: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Traversal options recorded with the snapshot.
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            follow_symlinks: self.follow_symlinks,
            include_hidden: self.include_hidden,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ScanConfig::builder()
            .roots(vec![PathBuf::from("/home/user")])
            .batch_size(50usize)
            .follow_symlinks(true)
            .build()
            .unwrap();

        assert_eq!(config.roots, vec![PathBuf::from("/home/user")]);
        assert_eq!(config.batch_size, 50);
        assert!(config.follow_symlinks);
        assert!(!config.include_hidden);
    }

    #[test]
    fn test_config_simple() {
        let config = ScanConfig::new(["/home/user"]);
        assert_eq!(config.roots.len(), 1);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.options().follow_symlinks);
    }

    #[test]
    fn test_builder_rejects_empty_roots() {
        let result = ScanConfig::builder().roots(Vec::<PathBuf>::new()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_batch() {
        let result = ScanConfig::builder()
            .roots(vec![PathBuf::from("/data")])
            .batch_size(0usize)
            .build();
        assert!(result.is_err());
    }
}
