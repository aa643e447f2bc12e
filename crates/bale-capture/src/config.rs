//! Client configuration.
//!
//! Loaded from TOML. Every key has a default, so an empty file (or no file at
//! all, via `Config::default()`) is a working configuration.
//!
//! ```toml
//! [device]
//! platform = "ios"
//!
//! [session]
//! reject_cooldown_ms = 1500
//!
//! [store]
//! path = "capture.db"
//!
//! [sync]
//! export_batch_size = 50
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use bale_capture_core::Platform;
use bale_capture_store::SqliteStore;
use bale_capture_sync::SyncConfig;

use crate::session::CaptureConfig;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub session: CaptureConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

/// The capture hardware this client runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Selects device-specific normalization rules.
    pub platform: Platform,
}

/// Where the local store lives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

impl Config {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("Failed to parse capture configuration")
    }

    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        tracing::info!(
            config_file = %path.display(),
            platform = ?config.device.platform,
            store = ?config.store.path,
            "config_loaded"
        );
        Ok(config)
    }

    /// Open the configured SQLite store.
    pub fn open_store(&self) -> anyhow::Result<SqliteStore> {
        match &self.store.path {
            Some(path) => SqliteStore::open(path)
                .with_context(|| format!("Failed to open store at {}", path.display())),
            None => SqliteStore::open_memory().context("Failed to open in-memory store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.session.reject_cooldown_ms, 1500);
        assert_eq!(config.sync.export_batch_size, 50);
        assert_eq!(config.device.platform, Platform::Other);
        assert!(config.store.path.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml_str(
            r#"
            [device]
            platform = "ios"

            [session]
            lookup_attempts = 5

            [store]
            path = "/var/lib/capture/capture.db"
            "#,
        )
        .unwrap();

        assert_eq!(config.device.platform, Platform::Ios);
        assert_eq!(config.session.lookup_attempts, 5);
        assert_eq!(config.session.retry_backoff_ms, 50);
        assert_eq!(
            config.store.path.as_deref(),
            Some(Path::new("/var/lib/capture/capture.db"))
        );
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn test_bad_platform_rejected() {
        assert!(Config::from_toml_str("[device]\nplatform = \"windows\"").is_err());
    }

    #[test]
    fn test_from_file_and_open_store() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("capture.db");
        let file = dir.path().join("capture.toml");
        fs::write(
            &file,
            format!("[store]\npath = {:?}\n\n[sync]\nimport_batch_size = 10\n", db),
        )
        .unwrap();

        let config = Config::from_file(&file).unwrap();
        assert_eq!(config.sync.import_batch_size, 10);
        config.open_store().unwrap();
        assert!(db.exists());
    }

    #[test]
    fn test_missing_file_has_context() {
        let err = Config::from_file("/nonexistent/capture.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
