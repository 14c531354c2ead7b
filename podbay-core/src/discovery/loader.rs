//! PodLoader - turns a directory tree into live, registered features
//!
//! The loader scans the features root, resolves dependency order,
//! instantiates pods (from shared libraries or builtin constructors),
//! wires them to the shared [`EventBus`] and [`ApiRegistry`], and keeps
//! the set live as files change.
//!
//! All mutation of the discovered-feature map is serialized behind a
//! single async mutex; an atomic flag additionally keeps overlapping
//! scan triggers from re-running the scan body. Discovery lifecycle
//! events are dispatched synchronously on the shared bus, so their
//! handlers must not call back into loader methods.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};
use std::time::Instant;

use chrono::Utc;
use globset::{Glob, GlobSet, GlobSetBuilder};
use libloading::Library;
use semver::Version;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use podbay_pod_api::{API_VERSION, ApiRegistry, EventBus, Pod, PodContext, PodError, PodSettings};

use super::config::DiscoveryConfig;
use super::error::{DiscoveryError, Result};
use super::metrics::{DiscoveryMetrics, LoaderHealth};
use super::scanner::{self, DiscoveredFeature, FeatureStatus, PodManifest, PodSource};
use super::switchboard::Switchboard;
use super::watcher;

/// Source id stamped on discovery lifecycle events
pub const DISCOVERY_SOURCE: &str = "discovery";

/// Event names emitted by the loader for external observers
pub mod events {
    /// A scan finished: `{featuresFound, totalTime, features}`
    pub const FEATURES_SCANNED: &str = "discovery.features.scanned";
    /// A feature reached the loaded state: `{featureName, version, loadTime}`
    pub const FEATURE_LOADED: &str = "discovery.feature.loaded";
    /// A feature completed a hot reload: `{featureName, timestamp}`
    pub const FEATURE_HOT_RELOADED: &str = "discovery.feature.hot-reloaded";
    /// A feature was unloaded: `{featureName, timestamp}`
    pub const FEATURE_UNLOADED: &str = "discovery.feature.unloaded";
}

/// Constructor for a builtin pod
pub type PodFactory = Box<dyn Fn() -> Box<dyn Pod> + Send + Sync>;

/// Result of one scan pass
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Features present after the pass
    pub features_found: usize,
    /// Scan duration in milliseconds
    pub duration_ms: u64,
    /// Feature names, sorted
    pub features: Vec<String>,
    /// Features whose files changed since the previous pass
    pub changed: Vec<String>,
    /// True when an in-flight scan made this trigger a no-op
    pub skipped: bool,
}

/// A live pod instance and everything needed to tear it down.
///
/// Field order matters: the instance must drop before the library that
/// holds its code.
struct LoadedPod {
    instance: Box<dyn Pod>,
    /// Contract name the feature was registered under (usually the
    /// directory name, but the contract wins on mismatch)
    registered_name: String,
    _library: Option<Library>,
}

/// Mutable loader state, all behind one mutex
struct LoaderState {
    features: HashMap<String, DiscoveredFeature>,
    loaded: HashMap<String, LoadedPod>,
    load_order: Vec<String>,
    metrics: DiscoveryMetrics,
    switchboard: Switchboard,
}

/// Feature discovery and hot-reload loader.
///
/// Create one with [`PodLoader::new`], wrap it in an [`Arc`], optionally
/// register builtin factories, then either call [`PodLoader::start`] for
/// the full scan/autoload/watch lifecycle or drive scans and loads
/// manually.
pub struct PodLoader {
    bus: Arc<EventBus>,
    registry: Arc<ApiRegistry>,
    config: DiscoveryConfig,
    excludes: GlobSet,
    watch_globs: Option<GlobSet>,
    builtins: StdRwLock<HashMap<String, PodFactory>>,
    state: Mutex<LoaderState>,
    scanning: AtomicBool,
    shutdown: CancellationToken,
    watcher: StdMutex<Option<notify::RecommendedWatcher>>,
}

impl PodLoader {
    /// Create a loader over the shared bus and registry
    pub fn new(
        config: DiscoveryConfig,
        bus: Arc<EventBus>,
        registry: Arc<ApiRegistry>,
    ) -> Result<Self> {
        let excludes = build_globset(&config.exclude_patterns)?;
        let watch_globs = if config.watch_patterns.is_empty() {
            None
        } else {
            Some(build_globset(&config.watch_patterns)?)
        };
        let switchboard = Switchboard::load(&config.features_dir.join("pods.toml"))?;

        Ok(Self {
            bus,
            registry,
            config,
            excludes,
            watch_globs,
            builtins: StdRwLock::new(HashMap::new()),
            state: Mutex::new(LoaderState {
                features: HashMap::new(),
                loaded: HashMap::new(),
                load_order: Vec::new(),
                metrics: DiscoveryMetrics::default(),
                switchboard,
            }),
            scanning: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            watcher: StdMutex::new(None),
        })
    }

    /// The loader's configuration
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// The shared event bus
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared API registry
    pub fn registry(&self) -> &Arc<ApiRegistry> {
        &self.registry
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Register a constructor for a builtin feature.
    ///
    /// A directory named `name` with a `pod.toml` manifest then counts
    /// as a feature even without a shared library. Builtin hot reload
    /// re-instantiates from this factory: config and manifest changes
    /// are picked up live, code changes need a host rebuild.
    pub fn register_builtin<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn Pod> + Send + Sync + 'static,
    {
        self.builtins
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(name.to_string(), Box::new(factory));
    }

    fn has_builtin(&self, name: &str) -> bool {
        self.builtins
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(name)
    }

    // ─── Scanning ────────────────────────────────────────────────────

    /// Scan the features root and refresh the discovered set.
    ///
    /// Scans are mutually exclusive: a trigger that arrives while one is
    /// in flight does not re-run the scan body and returns the unchanged
    /// snapshot with `skipped = true`.
    pub async fn scan(&self) -> Result<ScanSummary> {
        if self.scanning.swap(true, Ordering::SeqCst) {
            let state = self.state.lock().await;
            return Ok(snapshot_summary(&state));
        }
        let result = self.scan_inner().await;
        self.scanning.store(false, Ordering::SeqCst);
        result
    }

    async fn scan_inner(&self) -> Result<ScanSummary> {
        let started = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut found: Vec<String> = Vec::new();
        let mut changed: Vec<String> = Vec::new();

        let root = &self.config.features_dir;
        if root.is_dir() {
            for entry in std::fs::read_dir(root)? {
                let entry = entry?;
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string)
                else {
                    continue;
                };
                if self.excludes.is_match(&name) {
                    tracing::trace!(dir = %name, "Excluded from scan");
                    continue;
                }
                let Some(source) = scanner::probe_pod_source(&path, &name, self.has_builtin(&name))
                else {
                    // not a feature, and deliberately not an error
                    tracing::trace!(dir = %name, "No pod entry, skipping");
                    continue;
                };

                let manifest = PodManifest::read(&path);
                let config_file = scanner::probe_config_file(&path, &name);
                let last_modified = scanner::newest_mtime(&path, &source, config_file.as_deref());

                match state.features.get_mut(&name) {
                    Some(feature) => {
                        if last_modified > feature.last_modified {
                            changed.push(name.clone());
                        }
                        feature.path = path;
                        feature.version = manifest.parsed_version();
                        feature.dependencies = manifest.dependencies;
                        feature.source = source;
                        feature.config_file = config_file;
                        feature.last_modified = last_modified;
                    }
                    None => {
                        tracing::debug!(feature = %name, "Discovered feature");
                        state.features.insert(
                            name.clone(),
                            DiscoveredFeature {
                                name: name.clone(),
                                path,
                                version: manifest.parsed_version(),
                                source,
                                config_file,
                                last_modified,
                                status: FeatureStatus::Discovered,
                                error: None,
                                dependencies: manifest.dependencies,
                            },
                        );
                    }
                }
                found.push(name);
            }
        } else {
            tracing::debug!(dir = %root.display(), "Features directory does not exist");
        }

        // records whose directory disappeared go away, unloading first
        let vanished: Vec<String> = state
            .features
            .keys()
            .filter(|name| !found.contains(name))
            .cloned()
            .collect();
        for name in vanished {
            tracing::info!(feature = %name, "Feature directory disappeared");
            if state.loaded.contains_key(&name) {
                if let Err(e) = self.unload_locked(state, &name) {
                    tracing::warn!(feature = %name, error = %e, "Unload of vanished feature failed");
                }
            }
            state.features.remove(&name);
        }

        sync_counts(state);
        let duration_ms = started.elapsed().as_millis() as u64;
        state.metrics.last_scan_duration_ms = duration_ms;
        state.metrics.last_scan = Some(Utc::now());

        found.sort();
        changed.sort();
        self.bus.emit_sync(
            events::FEATURES_SCANNED,
            json!({
                "featuresFound": found.len(),
                "totalTime": duration_ms,
                "features": found,
            }),
            DISCOVERY_SOURCE,
        );

        Ok(ScanSummary {
            features_found: found.len(),
            duration_ms,
            features: found,
            changed,
            skipped: false,
        })
    }

    // ─── Loading ─────────────────────────────────────────────────────

    /// Load one discovered feature, dependencies first.
    ///
    /// Ignores the switchboard: an explicit load is operator intent.
    pub async fn load_feature(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut stack = Vec::new();
        self.load_locked(&mut state, name, &mut stack, false).await
    }

    /// Load every enabled feature in the discovered or error state.
    ///
    /// Load failures are recorded per feature and do not stop the pass.
    /// Returns the number of features loaded afterwards.
    pub async fn load_all(&self) -> usize {
        let mut state = self.state.lock().await;
        let mut names: Vec<String> = state
            .features
            .iter()
            .filter(|(_, f)| matches!(f.status, FeatureStatus::Discovered | FeatureStatus::Error))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        for name in names {
            if !state.switchboard.is_enabled(&name) {
                tracing::debug!(feature = %name, "Disabled, skipping autoload");
                continue;
            }
            let mut stack = Vec::new();
            // failures are already recorded on the feature
            let _ = self.load_locked(&mut state, &name, &mut stack, false).await;
        }
        state.metrics.loaded_features
    }

    /// Unload a loaded feature: shutdown hook, unsubscribe, unregister.
    pub async fn unload_feature(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        self.unload_locked(&mut state, name)
    }

    /// Hot reload: unload, refresh the on-disk record, load again.
    ///
    /// Dependents are not torn down. During the reload window the
    /// registry answers `has_feature == false` for this feature, which
    /// dependents must tolerate as transient.
    pub async fn reload_feature(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.features.contains_key(name) {
            return Err(DiscoveryError::FeatureNotFound {
                name: name.to_string(),
            });
        }
        tracing::info!(feature = %name, "Hot reloading");

        if state.loaded.contains_key(name) {
            self.unload_locked(&mut state, name)?;
        }
        self.refresh_feature(&mut state, name)?;

        let mut stack = Vec::new();
        self.load_locked(&mut state, name, &mut stack, true).await?;

        state.metrics.hot_reload_count += 1;
        self.bus.emit_sync(
            events::FEATURE_HOT_RELOADED,
            json!({
                "featureName": name,
                "timestamp": Utc::now().to_rfc3339(),
            }),
            DISCOVERY_SOURCE,
        );
        Ok(())
    }

    fn load_locked<'a>(
        &'a self,
        state: &'a mut LoaderState,
        name: &'a str,
        stack: &'a mut Vec<String>,
        force: bool,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            // a name already on the stack means the declarations form a
            // cycle, which is fatal rather than silently broken
            if stack.iter().any(|n| n == name) {
                let mut chain: Vec<&str> = stack.iter().map(String::as_str).collect();
                chain.push(name);
                return Err(DiscoveryError::CircularDependency {
                    chain: chain.join(" -> "),
                });
            }

            match state.features.get(name) {
                None => {
                    return Err(DiscoveryError::FeatureNotFound {
                        name: name.to_string(),
                    });
                }
                Some(f) if matches!(f.status, FeatureStatus::Loaded | FeatureStatus::Loading) => {
                    return Ok(());
                }
                Some(_) => {}
            }

            if let Some(f) = state.features.get_mut(name) {
                f.status = FeatureStatus::Loading;
                f.error = None;
            }
            sync_counts(state);

            stack.push(name.to_string());
            let result = self.load_steps(state, name, stack, force).await;
            stack.pop();

            match result {
                Ok((load_time_ms, version)) => {
                    if let Some(f) = state.features.get_mut(name) {
                        f.status = FeatureStatus::Loaded;
                        f.error = None;
                    }
                    sync_counts(state);
                    tracing::info!(feature = %name, version = %version, load_time_ms, "Feature loaded");
                    self.bus.emit_sync(
                        events::FEATURE_LOADED,
                        json!({
                            "featureName": name,
                            "version": version.to_string(),
                            "loadTime": load_time_ms,
                        }),
                        DISCOVERY_SOURCE,
                    );
                    Ok(())
                }
                Err(e) => {
                    // a failed pod leaves nothing behind, including any
                    // subscriptions it made during init
                    self.bus.unsubscribe_all(name);
                    if let Some(f) = state.features.get_mut(name) {
                        f.status = FeatureStatus::Error;
                        f.error = Some(e.to_string());
                    }
                    state.metrics.record_failure(name, &e.to_string());
                    sync_counts(state);
                    tracing::error!(feature = %name, error = %e, "Feature load failed");
                    Err(e)
                }
            }
        })
    }

    /// Steps 2-7 of the load algorithm. Any error here marks the
    /// feature failed; the caller does the bookkeeping.
    async fn load_steps(
        &self,
        state: &mut LoaderState,
        name: &str,
        stack: &mut Vec<String>,
        force: bool,
    ) -> Result<(u64, Version)> {
        let started = Instant::now();

        let (source, path, config_file, dependencies) = {
            let feature =
                state
                    .features
                    .get(name)
                    .ok_or_else(|| DiscoveryError::FeatureNotFound {
                        name: name.to_string(),
                    })?;
            (
                feature.source.clone(),
                feature.path.clone(),
                feature.config_file.clone(),
                feature.dependencies.clone(),
            )
        };

        // dependency closure: children load to completion before the
        // parent is instantiated, never partially
        for dependency in dependencies {
            if self.registry.has_feature(&dependency) {
                continue;
            }
            if !state.features.contains_key(&dependency) {
                return Err(DiscoveryError::MissingDependency {
                    feature: name.to_string(),
                    dependency,
                });
            }
            tracing::debug!(feature = %name, dependency = %dependency, "Loading dependency first");
            match self.load_locked(state, &dependency, stack, false).await {
                Ok(()) => {}
                Err(e @ DiscoveryError::CircularDependency { .. }) => return Err(e),
                Err(_) => {
                    return Err(DiscoveryError::DependencyFailed {
                        feature: name.to_string(),
                        dependency,
                    });
                }
            }
        }

        let (mut instance, library) = self.instantiate(name, &source)?;

        let settings = match &config_file {
            Some(path) => PodSettings::load(path)?,
            None => PodSettings::new(),
        };
        let mut ctx = PodContext::new(
            name,
            path.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.registry),
        )
        .with_settings(settings);

        match std::panic::catch_unwind(AssertUnwindSafe(|| instance.init(&mut ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(PodError::custom("pod panicked during init").into()),
        }

        // poll readiness until the load timeout elapses
        let timeout = self.config.load_timeout();
        let poll = self.config.ready_poll();
        let ready_started = Instant::now();
        loop {
            match std::panic::catch_unwind(AssertUnwindSafe(|| instance.is_ready())) {
                Ok(true) => break,
                Ok(false) => {}
                Err(_) => {
                    return Err(PodError::custom("pod panicked in readiness probe").into());
                }
            }
            if ready_started.elapsed() >= timeout {
                return Err(DiscoveryError::InitializationTimeout {
                    feature: name.to_string(),
                    timeout,
                });
            }
            tokio::time::sleep(poll).await;
        }

        let contract = instance.contract();
        if contract.name != name {
            tracing::warn!(
                feature = %name,
                contract = %contract.name,
                "Contract name differs from directory name"
            );
        }
        let version = contract.version.clone();
        let registered_name = contract.name.clone();
        let api = instance.api();
        if force {
            self.registry.force_register_feature(api, contract)?;
        } else {
            self.registry.register_feature(api, contract)?;
        }

        state.loaded.insert(
            name.to_string(),
            LoadedPod {
                instance,
                registered_name,
                _library: library,
            },
        );
        state.load_order.push(name.to_string());

        Ok((started.elapsed().as_millis() as u64, version))
    }

    fn unload_locked(&self, state: &mut LoaderState, name: &str) -> Result<()> {
        let Some(mut pod) = state.loaded.remove(name) else {
            return Err(DiscoveryError::FeatureNotFound {
                name: name.to_string(),
            });
        };

        // shutdown is idempotent by contract; a failure here must not
        // stop the teardown
        match std::panic::catch_unwind(AssertUnwindSafe(|| pod.instance.shutdown())) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(feature = %name, error = %e, "Pod shutdown returned error");
            }
            Err(_) => {
                tracing::warn!(feature = %name, "Pod panicked during shutdown");
            }
        }

        self.bus.unsubscribe_all(name);
        self.registry.unregister_feature(&pod.registered_name);
        state.load_order.retain(|n| n != name);
        if let Some(f) = state.features.get_mut(name) {
            f.status = FeatureStatus::Unloaded;
            f.error = None;
        }
        sync_counts(state);

        tracing::info!(feature = %name, "Feature unloaded");
        self.bus.emit_sync(
            events::FEATURE_UNLOADED,
            json!({
                "featureName": name,
                "timestamp": Utc::now().to_rfc3339(),
            }),
            DISCOVERY_SOURCE,
        );

        // instance drops before its library (field order in LoadedPod)
        drop(pod);
        Ok(())
    }

    /// Re-probe a feature's directory before a reload so the fresh
    /// manifest, config, and entry are observed.
    fn refresh_feature(&self, state: &mut LoaderState, name: &str) -> Result<()> {
        let dir = match state.features.get(name) {
            Some(f) => f.path.clone(),
            None => {
                return Err(DiscoveryError::FeatureNotFound {
                    name: name.to_string(),
                });
            }
        };

        let source = if dir.is_dir() {
            scanner::probe_pod_source(&dir, name, self.has_builtin(name))
        } else {
            None
        };
        let Some(source) = source else {
            state.features.remove(name);
            sync_counts(state);
            return Err(DiscoveryError::FeatureNotFound {
                name: name.to_string(),
            });
        };

        let manifest = PodManifest::read(&dir);
        let config_file = scanner::probe_config_file(&dir, name);
        let last_modified = scanner::newest_mtime(&dir, &source, config_file.as_deref());
        if let Some(feature) = state.features.get_mut(name) {
            feature.version = manifest.parsed_version();
            feature.dependencies = manifest.dependencies;
            feature.source = source;
            feature.config_file = config_file;
            feature.last_modified = last_modified;
        }
        Ok(())
    }

    fn instantiate(
        &self,
        name: &str,
        source: &PodSource,
    ) -> Result<(Box<dyn Pod>, Option<Library>)> {
        match source {
            PodSource::Builtin => {
                let builtins = self
                    .builtins
                    .read()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                let factory =
                    builtins
                        .get(name)
                        .ok_or_else(|| DiscoveryError::NoBuiltinFactory {
                            feature: name.to_string(),
                        })?;
                Ok((factory(), None))
            }
            PodSource::Library(path) => {
                // SAFETY: loading a library the operator placed in the
                // features directory; it is expected to follow the pod
                // ABI contract generated by export_pod!.
                let library = unsafe { Library::new(path)? };

                let found = {
                    // SAFETY: calling a C function exported by the pod library.
                    let version_fn: libloading::Symbol<extern "C" fn() -> u32> = unsafe {
                        library.get(b"_podbay_pod_api_version")
                    }
                    .map_err(|_| DiscoveryError::MissingExport {
                        feature: name.to_string(),
                        symbol: "_podbay_pod_api_version".to_string(),
                    })?;
                    version_fn()
                };
                if found != API_VERSION {
                    return Err(DiscoveryError::ApiVersionMismatch {
                        expected: API_VERSION,
                        found,
                    });
                }

                let instance = {
                    // SAFETY: the create function returns a pointer produced
                    // by Box::into_raw in export_pod!; ownership transfers
                    // back to a Box here.
                    let create_fn: libloading::Symbol<extern "C" fn() -> *mut dyn Pod> = unsafe {
                        library.get(b"_podbay_pod_create")
                    }
                    .map_err(|_| DiscoveryError::MissingExport {
                        feature: name.to_string(),
                        symbol: "_podbay_pod_create".to_string(),
                    })?;
                    unsafe { Box::from_raw(create_fn()) }
                };

                Ok((instance, Some(library)))
            }
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────

    /// Run the full lifecycle: initial scan, autoload, filesystem
    /// watcher, and periodic rescans. Returns after the initial pass;
    /// watcher and rescan tasks run until [`PodLoader::stop`].
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.scan().await?;
        if self.config.enable_auto_load {
            self.load_all().await;
        }

        if self.config.enable_hot_reload {
            let handle = watcher::spawn(Arc::clone(self))?;
            *self
                .watcher
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = handle;
        }

        if self.config.scan_interval_ms > 0 {
            let loader = Arc::clone(self);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(loader.config.scan_interval());
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // the first tick completes immediately and the initial
                // scan already ran
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = loader.shutdown.cancelled() => break,
                        _ = ticker.tick() => {
                            match loader.scan().await {
                                Ok(_) if loader.config.enable_auto_load => {
                                    loader.load_all().await;
                                }
                                Ok(_) => {}
                                Err(e) => tracing::error!(error = %e, "Periodic scan failed"),
                            }
                        }
                    }
                }
            });
        }

        Ok(())
    }

    /// Stop background tasks and unload everything in reverse load order
    pub async fn stop(&self) {
        self.shutdown.cancel();
        drop(
            self.watcher
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take(),
        );

        let mut state = self.state.lock().await;
        let order: Vec<String> = state.load_order.clone();
        for name in order.iter().rev() {
            if let Err(e) = self.unload_locked(&mut state, name) {
                tracing::warn!(feature = %name, error = %e, "Unload during stop failed");
            }
        }
    }

    /// React to changed paths under the features root: reload the owning
    /// features that are loaded, rescan for anything else. The watcher
    /// calls this after debouncing; embedders can call it directly to
    /// force change handling.
    pub async fn handle_fs_change(&self, paths: Vec<PathBuf>) {
        let canonical_root = self
            .config
            .features_dir
            .canonicalize()
            .unwrap_or_else(|_| self.config.features_dir.clone());

        let mut touched: Vec<String> = Vec::new();
        let mut needs_scan = false;
        for path in paths {
            if let Some(globs) = &self.watch_globs {
                let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                    continue;
                };
                if !globs.is_match(file_name) {
                    continue;
                }
            }
            let rel = match path
                .strip_prefix(&canonical_root)
                .or_else(|_| path.strip_prefix(&self.config.features_dir))
            {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            match rel.components().next() {
                Some(std::path::Component::Normal(first)) => {
                    if let Some(name) = first.to_str()
                        && !touched.iter().any(|t| t == name)
                    {
                        touched.push(name.to_string());
                    }
                }
                _ => needs_scan = true,
            }
        }

        for name in touched {
            let status = {
                let state = self.state.lock().await;
                state.features.get(&name).map(|f| f.status)
            };
            match status {
                Some(FeatureStatus::Loaded) => {
                    tracing::info!(feature = %name, "Change detected, hot reloading");
                    if let Err(e) = self.reload_feature(&name).await {
                        tracing::error!(feature = %name, error = %e, "Hot reload failed");
                    }
                }
                _ => needs_scan = true,
            }
        }

        if needs_scan {
            match self.scan().await {
                Ok(_) if self.config.enable_auto_load => {
                    self.load_all().await;
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Rescan after file change failed"),
            }
        }
    }

    // ─── Introspection ───────────────────────────────────────────────

    /// Snapshot of the discovery metrics
    pub async fn metrics(&self) -> DiscoveryMetrics {
        self.state.lock().await.metrics.clone()
    }

    /// Aggregate loader health derived from the metrics
    pub async fn health(&self) -> LoaderHealth {
        self.state.lock().await.metrics.health()
    }

    /// Snapshot of one discovered feature
    pub async fn feature(&self, name: &str) -> Option<DiscoveredFeature> {
        self.state.lock().await.features.get(name).cloned()
    }

    /// Snapshot of all discovered features, sorted by name
    pub async fn features(&self) -> Vec<DiscoveredFeature> {
        let state = self.state.lock().await;
        let mut features: Vec<DiscoveredFeature> = state.features.values().cloned().collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));
        features
    }

    /// Re-include a pod in autoload and persist the switchboard
    pub async fn enable_pod(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.switchboard.enable(name);
        state
            .switchboard
            .save(&self.config.features_dir.join("pods.toml"))
    }

    /// Exclude a pod from autoload and persist the switchboard
    pub async fn disable_pod(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.switchboard.disable(name);
        state
            .switchboard
            .save(&self.config.features_dir.join("pods.toml"))
    }
}

fn sync_counts(state: &mut LoaderState) {
    state.metrics.total_features = state.features.len();
    state.metrics.loaded_features = state
        .features
        .values()
        .filter(|f| f.status == FeatureStatus::Loaded)
        .count();
    state.metrics.error_features = state
        .features
        .values()
        .filter(|f| f.status == FeatureStatus::Error)
        .count();
}

fn snapshot_summary(state: &LoaderState) -> ScanSummary {
    let mut features: Vec<String> = state.features.keys().cloned().collect();
    features.sort();
    ScanSummary {
        features_found: features.len(),
        duration_ms: state.metrics.last_scan_duration_ms,
        features,
        changed: Vec::new(),
        skipped: true,
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader_over(dir: &TempDir) -> PodLoader {
        let config = DiscoveryConfig {
            features_dir: dir.path().to_path_buf(),
            ..DiscoveryConfig::default()
        };
        PodLoader::new(config, Arc::new(EventBus::new()), Arc::new(ApiRegistry::new())).unwrap()
    }

    fn write_manifest(dir: &TempDir, feature: &str) {
        let feature_dir = dir.path().join(feature);
        std::fs::create_dir_all(&feature_dir).unwrap();
        std::fs::write(feature_dir.join("pod.toml"), "version = \"1.0.0\"\n").unwrap();
    }

    #[tokio::test]
    async fn test_scan_skips_directories_without_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/README.md"), "nothing to load").unwrap();

        let loader = loader_over(&dir);
        let summary = loader.scan().await.unwrap();
        assert_eq!(summary.features_found, 0);
        assert!(loader.feature("docs").await.is_none());
    }

    #[tokio::test]
    async fn test_scan_skips_excluded_directories() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "target");
        write_manifest(&dir, ".hidden");

        let loader = loader_over(&dir);
        loader.register_builtin("target", || unreachable!());
        loader.register_builtin(".hidden", || unreachable!());

        let summary = loader.scan().await.unwrap();
        assert_eq!(summary.features_found, 0);
    }

    #[tokio::test]
    async fn test_scan_discovers_builtin_with_manifest() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "inventory-system");

        let loader = loader_over(&dir);
        loader.register_builtin("inventory-system", || unreachable!());

        let summary = loader.scan().await.unwrap();
        assert_eq!(summary.features, vec!["inventory-system"]);

        let feature = loader.feature("inventory-system").await.unwrap();
        assert_eq!(feature.status, FeatureStatus::Discovered);
        assert_eq!(feature.source, PodSource::Builtin);
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_empty_not_error() {
        let dir = TempDir::new().unwrap();
        let config = DiscoveryConfig {
            features_dir: dir.path().join("does-not-exist"),
            ..DiscoveryConfig::default()
        };
        let loader = PodLoader::new(
            config,
            Arc::new(EventBus::new()),
            Arc::new(ApiRegistry::new()),
        )
        .unwrap();

        let summary = loader.scan().await.unwrap();
        assert_eq!(summary.features_found, 0);
    }

    #[tokio::test]
    async fn test_overlapping_scan_trigger_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "inventory-system");

        let loader = loader_over(&dir);
        loader.register_builtin("inventory-system", || unreachable!());
        loader.scan().await.unwrap();

        // simulate an in-flight scan; the second trigger must not run
        // the scan body and reports the snapshot unchanged
        loader.scanning.store(true, Ordering::SeqCst);
        let summary = loader.scan().await.unwrap();
        assert!(summary.skipped);
        assert_eq!(summary.features, vec!["inventory-system"]);
        loader.scanning.store(false, Ordering::SeqCst);

        let summary = loader.scan().await.unwrap();
        assert!(!summary.skipped);
    }

    #[tokio::test]
    async fn test_scan_drops_vanished_directories() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "inventory-system");

        let loader = loader_over(&dir);
        loader.register_builtin("inventory-system", || unreachable!());
        loader.scan().await.unwrap();
        assert!(loader.feature("inventory-system").await.is_some());

        std::fs::remove_dir_all(dir.path().join("inventory-system")).unwrap();
        loader.scan().await.unwrap();
        assert!(loader.feature("inventory-system").await.is_none());
    }

    #[tokio::test]
    async fn test_scan_marks_changed_on_newer_mtime() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "inventory-system");

        let loader = loader_over(&dir);
        loader.register_builtin("inventory-system", || unreachable!());
        loader.scan().await.unwrap();

        // push the manifest mtime into the future so the next scan sees
        // a change without sleeping
        let manifest = dir.path().join("inventory-system/pod.toml");
        let future = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        let file = std::fs::File::options().write(true).open(&manifest).unwrap();
        file.set_modified(future).unwrap();

        let summary = loader.scan().await.unwrap();
        assert_eq!(summary.changed, vec!["inventory-system"]);
    }

    #[tokio::test]
    async fn test_load_unknown_feature() {
        let dir = TempDir::new().unwrap();
        let loader = loader_over(&dir);
        let err = loader.load_feature("ghost").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::FeatureNotFound { .. }));
    }

    #[tokio::test]
    async fn test_scanned_event_is_emitted() {
        let dir = TempDir::new().unwrap();
        write_manifest(&dir, "inventory-system");

        let bus = Arc::new(EventBus::new());
        let config = DiscoveryConfig {
            features_dir: dir.path().to_path_buf(),
            ..DiscoveryConfig::default()
        };
        let loader =
            PodLoader::new(config, Arc::clone(&bus), Arc::new(ApiRegistry::new())).unwrap();
        loader.register_builtin("inventory-system", || unreachable!());

        let seen = Arc::new(std::sync::Mutex::new(None));
        let s = Arc::clone(&seen);
        bus.subscribe(events::FEATURES_SCANNED, "observer", move |event| {
            *s.lock().unwrap() = Some(event.payload.clone());
        })
        .unwrap();

        loader.scan().await.unwrap();

        let seen = seen.lock().unwrap();
        let payload = seen.as_ref().unwrap();
        assert_eq!(payload["featuresFound"], 1);
        assert_eq!(payload["features"][0], "inventory-system");
    }
}
