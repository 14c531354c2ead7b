//! PodContext - a pod's handle on the shared runtime services

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::bus::EventBus;
use crate::error::{BusError, PodError, RegistryError};
use crate::event::{PodEvent, SubscriptionId};
use crate::registry::ApiRegistry;

/// Per-pod settings - persistent key-value store backed by TOML.
///
/// Loaded from the feature directory's `config.toml` by the loader and
/// handed to the pod at init.
pub struct PodSettings {
    values: HashMap<String, toml::Value>,
    dirty: bool,
}

impl PodSettings {
    /// Create an empty settings store
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            dirty: false,
        }
    }

    /// Load settings from a TOML file.
    ///
    /// Returns an empty store if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, PodError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let values: HashMap<String, toml::Value> =
            toml::from_str(&content).map_err(|e| PodError::Config(e.to_string()))?;
        Ok(Self {
            values,
            dirty: false,
        })
    }

    /// Save settings to a TOML file
    pub fn save(&mut self, path: &Path) -> Result<(), PodError> {
        let content = toml::to_string_pretty(&self.values)
            .map_err(|e| PodError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        self.dirty = false;
        Ok(())
    }

    /// Get a settings value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|v| v.clone().try_into().ok())
    }

    /// Set a settings value
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PodError> {
        let toml_value =
            toml::Value::try_from(value).map_err(|e| PodError::Serialization(e.to_string()))?;
        self.values.insert(key.to_string(), toml_value);
        self.dirty = true;
        Ok(())
    }

    /// Whether there are unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl Default for PodSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// A pod's interface to the runtime.
///
/// Handed to the pod at init with the shared [`EventBus`] and
/// [`ApiRegistry`] already wired in; the subscribe/emit conveniences
/// stamp the pod's feature name as owner and source, which is what lets
/// the loader tear all of a pod's subscriptions down at unload.
pub struct PodContext {
    feature_name: String,
    feature_dir: PathBuf,
    bus: Arc<EventBus>,
    registry: Arc<ApiRegistry>,
    settings: PodSettings,
}

impl PodContext {
    /// Create a context for `feature_name` rooted at `feature_dir`
    pub fn new(
        feature_name: impl Into<String>,
        feature_dir: impl Into<PathBuf>,
        bus: Arc<EventBus>,
        registry: Arc<ApiRegistry>,
    ) -> Self {
        Self {
            feature_name: feature_name.into(),
            feature_dir: feature_dir.into(),
            bus,
            registry,
            settings: PodSettings::new(),
        }
    }

    /// Builder: attach pre-loaded settings
    pub fn with_settings(mut self, settings: PodSettings) -> Self {
        self.settings = settings;
        self
    }

    /// The feature's name (also the subscription owner id)
    pub fn feature_name(&self) -> &str {
        &self.feature_name
    }

    /// The feature's directory (for storing data files)
    pub fn feature_dir(&self) -> &Path {
        &self.feature_dir
    }

    /// The shared event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared API registry
    pub fn registry(&self) -> &Arc<ApiRegistry> {
        &self.registry
    }

    // ─── Events ──────────────────────────────────────────────────────

    /// Subscribe to an event with this pod as owner
    pub fn subscribe<F>(&self, event_name: &str, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&PodEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(event_name, &self.feature_name, handler)
    }

    /// Emit an event synchronously with this pod as source
    pub fn emit_sync(&self, event_name: &str, payload: Value) -> usize {
        self.bus.emit_sync(event_name, payload, &self.feature_name)
    }

    /// Emit an event asynchronously with this pod as source
    pub async fn emit(&self, event_name: &str, payload: Value) -> usize {
        self.bus.emit(event_name, payload, &self.feature_name).await
    }

    // ─── Dependencies ────────────────────────────────────────────────

    /// Resolve a dependency's API by name.
    ///
    /// During a dependency's hot-reload window this returns
    /// [`RegistryError::FeatureNotFound`]; that is expected, transient,
    /// and must be tolerated rather than treated as fatal.
    pub fn get_dependency(
        &self,
        name: &str,
    ) -> Result<Arc<dyn crate::FeatureApi>, RegistryError> {
        self.registry.get_feature(name)
    }

    // ─── Settings ────────────────────────────────────────────────────

    /// Read a settings value
    pub fn config_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.settings.get(key)
    }

    /// Write a settings value
    pub fn config_set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), PodError> {
        self.settings.set(key, value)
    }

    /// Persist settings back to the feature directory's `config.toml`
    pub fn config_save(&mut self) -> Result<(), PodError> {
        let path = self.feature_dir.join("config.toml");
        self.settings.save(&path)
    }

    // ─── Logging ─────────────────────────────────────────────────────

    /// Log an info message (prefixed with the feature name)
    pub fn log_info(&self, message: &str) {
        tracing::info!(feature = %self.feature_name, "{}", message);
    }

    /// Log a warning message
    pub fn log_warn(&self, message: &str) {
        tracing::warn!(feature = %self.feature_name, "{}", message);
    }

    /// Log an error message
    pub fn log_error(&self, message: &str) {
        tracing::error!(feature = %self.feature_name, "{}", message);
    }

    /// Log a debug message
    pub fn log_debug(&self, message: &str) {
        tracing::debug!(feature = %self.feature_name, "{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn context(name: &str) -> PodContext {
        PodContext::new(
            name,
            PathBuf::from("/tmp/pods").join(name),
            Arc::new(EventBus::new()),
            Arc::new(ApiRegistry::new()),
        )
    }

    #[test]
    fn test_context_accessors() {
        let ctx = context("combat-system");
        assert_eq!(ctx.feature_name(), "combat-system");
        assert!(ctx.feature_dir().ends_with("combat-system"));
    }

    #[test]
    fn test_subscribe_uses_feature_name_as_owner() {
        let ctx = context("combat-system");
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        ctx.subscribe("tick", move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        ctx.emit_sync("tick", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        ctx.bus().unsubscribe_all("combat-system");
        ctx.emit_sync("tick", json!({}));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_emit_stamps_source() {
        let ctx = context("combat-system");
        let source = Arc::new(std::sync::Mutex::new(String::new()));
        let s = Arc::clone(&source);
        ctx.subscribe("combat.hit", move |event| {
            *s.lock().unwrap() = event.source.clone();
        })
        .unwrap();

        ctx.emit_sync("combat.hit", json!({"damage": 7}));
        assert_eq!(*source.lock().unwrap(), "combat-system");
    }

    #[test]
    fn test_get_dependency_miss() {
        let ctx = context("flask-system");
        let err = ctx.get_dependency("inventory-system").err().unwrap();
        assert!(matches!(err, RegistryError::FeatureNotFound { .. }));
    }

    #[test]
    fn test_settings_get_set() {
        let mut settings = PodSettings::new();
        settings.set("threshold", 100i64).unwrap();
        settings.set("label", "boss").unwrap();

        assert_eq!(settings.get::<i64>("threshold"), Some(100));
        assert_eq!(settings.get::<String>("label"), Some("boss".to_string()));
        assert_eq!(settings.get::<String>("missing"), None);
        assert!(settings.is_dirty());
    }

    #[test]
    fn test_settings_save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut settings = PodSettings::new();
        settings.set("max_flasks", 5i64).unwrap();
        settings.save(&path).unwrap();
        assert!(!settings.is_dirty());

        let loaded = PodSettings::load(&path).unwrap();
        assert_eq!(loaded.get::<i64>("max_flasks"), Some(5));
    }

    #[test]
    fn test_settings_load_missing_file() {
        let settings = PodSettings::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert!(settings.get::<String>("anything").is_none());
    }

    #[test]
    fn test_config_save_writes_feature_dir() {
        let dir = TempDir::new().unwrap();
        let mut ctx = PodContext::new(
            "inventory-system",
            dir.path(),
            Arc::new(EventBus::new()),
            Arc::new(ApiRegistry::new()),
        );
        ctx.config_set("slots", 60i64).unwrap();
        ctx.config_save().unwrap();

        let reloaded = PodSettings::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(reloaded.get::<i64>("slots"), Some(60));
    }
}
