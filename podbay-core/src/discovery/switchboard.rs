//! Switchboard - persisted enable/disable state for pods
//!
//! Stored as TOML next to the features it governs (`pods.toml` in the
//! features root). Everything is enabled unless disabled: autoload skips
//! disabled features, explicit loads override.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{DiscoveryError, Result};

/// Set of disabled pod names
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Switchboard {
    /// Names excluded from autoload
    #[serde(default)]
    disabled: HashSet<String>,
}

impl Switchboard {
    /// Load from a TOML file.
    ///
    /// Returns the empty (all-enabled) switchboard if the file doesn't
    /// exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DiscoveryError::Config(e.to_string()))
    }

    /// Save to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DiscoveryError::Config(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether a pod participates in autoload
    pub fn is_enabled(&self, name: &str) -> bool {
        !self.disabled.contains(name)
    }

    /// Exclude a pod from autoload
    pub fn disable(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    /// Re-include a pod in autoload
    pub fn enable(&mut self, name: &str) {
        self.disabled.remove(name);
    }

    /// Iterator over disabled pod names
    pub fn disabled_pods(&self) -> impl Iterator<Item = &str> {
        self.disabled.iter().map(String::as_str)
    }
}
