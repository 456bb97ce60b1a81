//! Engine configuration.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tidyvault_analyze::{DuplicateConfig, RiskPolicy};
use tidyvault_core::DEFAULT_BATCH_SIZE;

use crate::error::{CleanupError, Result};

/// How long quarantined files are kept after execution.
///
/// Disabled unless a TTL is configured: without one, quarantined files stay
/// until their action is undone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub quarantine_ttl_days: Option<u32>,
}

impl RetentionPolicy {
    pub fn days(days: u32) -> Self {
        Self {
            quarantine_ttl_days: Some(days),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.quarantine_ttl_days.is_some()
    }

    /// Actions executed at or before the returned time are expired at `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.quarantine_ttl_days
            .map(|days| now - Duration::days(i64::from(days)))
    }
}

/// Everything an [`Engine`](crate::Engine) needs to start.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQLite catalog file.
    pub catalog_path: PathBuf,

    /// Quarantine area. Must not overlap any cleanup root.
    pub quarantine_dir: PathBuf,

    /// Records buffered per catalog batch while scanning.
    pub scan_batch_size: usize,

    pub duplicates: DuplicateConfig,

    pub risk: RiskPolicy,

    pub retention: RetentionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tidyvault");
        Self {
            catalog_path: data_dir.join("catalog.db"),
            quarantine_dir: data_dir.join("quarantine"),
            scan_batch_size: DEFAULT_BATCH_SIZE,
            duplicates: DuplicateConfig::default(),
            risk: RiskPolicy::default(),
            retention: RetentionPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tidyvault").join("config.toml"))
    }

    /// Read a TOML configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Parse a TOML document. Absent keys keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| CleanupError::Config(e.to_string()))
    }

    /// Place the catalog and quarantine under `dir`.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.catalog_path = dir.join("catalog.db");
        self.quarantine_dir = dir.join("quarantine");
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.catalog_path.ends_with("tidyvault/catalog.db"));
        assert!(config.quarantine_dir.ends_with("tidyvault/quarantine"));
        assert_eq!(config.scan_batch_size, DEFAULT_BATCH_SIZE);
        assert!(!config.retention.is_enabled());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            quarantine_dir = "/var/tidyvault/q"

            [retention]
            quarantine_ttl_days = 14

            [risk]
            recent_days = 7
            "#,
        )
        .unwrap();

        assert_eq!(config.quarantine_dir, PathBuf::from("/var/tidyvault/q"));
        assert_eq!(config.retention, RetentionPolicy::days(14));
        assert_eq!(config.risk.recent_days, 7);
        assert!(!config.risk.junk_extensions.is_empty());
        assert_eq!(config.duplicates.hash_buffer, 64 * 1024);
    }

    #[test]
    fn test_invalid_toml() {
        let err = EngineConfig::from_toml("scan_batch_size = \"many\"").unwrap_err();
        assert!(matches!(err, CleanupError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = EngineConfig::load(Path::new("/nonexistent/tidyvault.toml")).unwrap();
        assert_eq!(config.scan_batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 0, 0, 0).unwrap();
        assert_eq!(RetentionPolicy::default().cutoff(now), None);
        assert_eq!(
            RetentionPolicy::days(30).cutoff(now),
            Some(Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap())
        );
    }
}
