//! Feature records and filesystem probing
//!
//! A feature is any immediate subdirectory of the features root that
//! carries a recognizable pod entry: a shared library under one of the
//! conventional names, or a `pod.toml` manifest naming a builtin
//! constructor registered with the loader. Directories with neither are
//! not features and are silently skipped.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a discovered feature.
///
/// Transitions: `Discovered -> Loading -> {Loaded | Error}`;
/// `Loaded -> {Unloaded | Loading}` (hot reload); `Error -> Loading`
/// (retry on rescan).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    /// Present on disk, not yet loaded
    Discovered,
    /// Load in progress
    Loading,
    /// Loaded and registered
    Loaded,
    /// Last load attempt failed
    Error,
    /// Explicitly unloaded
    Unloaded,
}

impl FeatureStatus {
    /// String form used in payloads and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Error => "error",
            Self::Unloaded => "unloaded",
        }
    }
}

/// Where a feature's pod implementation comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PodSource {
    /// Shared library at this path, opened with libloading
    Library(PathBuf),
    /// Constructor registered with the loader under the feature name
    Builtin,
}

/// One feature as seen by the loader. Keyed by directory name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredFeature {
    /// Directory name, the discovery key and subscription owner id
    pub name: String,
    /// Feature directory
    pub path: PathBuf,
    /// Version from the manifest (default 1.0.0)
    pub version: Version,
    /// Pod implementation source
    pub source: PodSource,
    /// Optional per-feature config file
    pub config_file: Option<PathBuf>,
    /// Newest modification time across the probed files
    pub last_modified: Option<DateTime<Utc>>,
    /// Current lifecycle state
    pub status: FeatureStatus,
    /// Message from the last failed load, if any
    pub error: Option<String>,
    /// Dependencies declared in the manifest
    pub dependencies: Vec<String>,
}

/// Optional `pod.toml` manifest in a feature directory
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PodManifest {
    /// Feature version (semver string)
    pub version: Option<String>,
    /// Feature names this pod depends on
    pub dependencies: Vec<String>,
    /// Human-readable description
    pub description: Option<String>,
}

impl PodManifest {
    /// Read the manifest from a feature directory.
    ///
    /// Missing file or unparsable content yields the defaults - scanning
    /// is lenient, load-time is where failures become errors.
    pub fn read(dir: &Path) -> Self {
        let path = dir.join("pod.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&content) {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unparsable pod manifest");
                Self::default()
            }
        }
    }

    /// Parsed version, defaulting to 1.0.0 on absence or bad input
    pub fn parsed_version(&self) -> Version {
        match self.version.as_deref().map(Version::parse) {
            Some(Ok(version)) => version,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Ignoring unparsable pod version");
                Version::new(1, 0, 0)
            }
            None => Version::new(1, 0, 0),
        }
    }
}

/// Per-OS shared library extensions, most specific first
fn library_extensions() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["so"]
    }
}

/// Probe a feature directory for its pod entry.
///
/// Library names are tried in a fixed order for each platform extension:
/// `<name>.pod.<ext>`, `pod.<ext>`, `lib<name_snake>.<ext>`,
/// `<name>.<ext>`. If no library matches and a builtin factory exists
/// for `name`, a `pod.toml` manifest marks the directory as a builtin
/// feature. `None` means "not a feature".
pub fn probe_pod_source(dir: &Path, name: &str, has_builtin: bool) -> Option<PodSource> {
    let snake = name.replace('-', "_");
    for ext in library_extensions() {
        for candidate in [
            format!("{name}.pod.{ext}"),
            format!("pod.{ext}"),
            format!("lib{snake}.{ext}"),
            format!("{name}.{ext}"),
        ] {
            let path = dir.join(candidate);
            if path.exists() {
                return Some(PodSource::Library(path));
            }
        }
    }
    if has_builtin && dir.join("pod.toml").exists() {
        return Some(PodSource::Builtin);
    }
    None
}

/// Probe for the optional per-feature config file
pub fn probe_config_file(dir: &Path, name: &str) -> Option<PathBuf> {
    for candidate in ["config.toml".to_string(), format!("{name}.config.toml")] {
        let path = dir.join(candidate);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

/// Newest modification time across the files that define a feature
pub fn newest_mtime(dir: &Path, source: &PodSource, config_file: Option<&Path>) -> Option<DateTime<Utc>> {
    let mut candidates: Vec<PathBuf> = vec![dir.join("pod.toml")];
    if let PodSource::Library(path) = source {
        candidates.push(path.clone());
    }
    if let Some(config) = config_file {
        candidates.push(config.to_path_buf());
    }

    candidates
        .iter()
        .filter_map(|p| p.metadata().and_then(|m| m.modified()).ok())
        .map(DateTime::<Utc>::from)
        .max()
}
