//! Discovery configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{DiscoveryError, Result};

/// Configuration for the discovery loader.
///
/// All fields have serde defaults so a partial TOML file works:
///
/// ```toml
/// features_dir = "game/features"
/// scan_interval_ms = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Root directory scanned for feature subdirectories
    pub features_dir: PathBuf,
    /// Reload features when their files change on disk
    pub enable_hot_reload: bool,
    /// Load every discovered feature after a scan
    pub enable_auto_load: bool,
    /// File-name globs the watcher reacts to; empty means all files
    pub watch_patterns: Vec<String>,
    /// Directory-name globs excluded from scanning
    pub exclude_patterns: Vec<String>,
    /// Periodic rescan interval in milliseconds; 0 disables the timer
    pub scan_interval_ms: u64,
    /// Per-feature load timeout in milliseconds
    pub load_timeout_ms: u64,
    /// Readiness poll interval in milliseconds
    pub ready_poll_ms: u64,
    /// Quiet period after a file change before hot reload fires
    pub debounce_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            features_dir: PathBuf::from("./features"),
            enable_hot_reload: true,
            enable_auto_load: true,
            watch_patterns: vec![
                "*.so".to_string(),
                "*.dylib".to_string(),
                "*.dll".to_string(),
                "*.toml".to_string(),
            ],
            exclude_patterns: vec![
                "target".to_string(),
                "tests".to_string(),
                ".*".to_string(),
            ],
            scan_interval_ms: 5_000,
            load_timeout_ms: 30_000,
            ready_poll_ms: 50,
            debounce_ms: 200,
        }
    }
}

impl DiscoveryConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DiscoveryError::Config(e.to_string()))
    }

    /// Periodic rescan interval
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    /// Per-feature load timeout
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Readiness poll interval
    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }

    /// Watcher debounce quiet period
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.features_dir, PathBuf::from("./features"));
        assert!(config.enable_hot_reload);
        assert!(config.enable_auto_load);
        assert_eq!(config.scan_interval(), Duration::from_secs(5));
        assert_eq!(config.load_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: DiscoveryConfig =
            toml::from_str("features_dir = \"game/features\"\nscan_interval_ms = 10000\n").unwrap();
        assert_eq!(config.features_dir, PathBuf::from("game/features"));
        assert_eq!(config.scan_interval_ms, 10_000);
        assert!(config.enable_auto_load);
        assert_eq!(config.load_timeout_ms, 30_000);
    }

    #[test]
    fn test_from_file_missing_is_io_error() {
        let err = DiscoveryConfig::from_file(Path::new("/nonexistent/discovery.toml")).unwrap_err();
        assert!(matches!(err, DiscoveryError::Io(_)));
    }

    #[test]
    fn test_from_file_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("discovery.toml");
        let config = DiscoveryConfig {
            enable_hot_reload: false,
            ..DiscoveryConfig::default()
        };
        std::fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = DiscoveryConfig::from_file(&path).unwrap();
        assert!(!loaded.enable_hot_reload);
        assert_eq!(loaded.features_dir, config.features_dir);
    }
}
