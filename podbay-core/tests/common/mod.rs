//! Shared fixtures for the discovery integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use podbay_core::discovery::{DiscoveryConfig, PodLoader};
use podbay_pod_api::{
    ApiRegistry, EventBus, FeatureApi, FeatureContract, MethodTable, Pod, PodContext, PodError,
};

/// Shared observation points into test pod instances.
///
/// The same probe is captured by a builtin factory, so counters survive
/// re-instantiation across hot reloads.
#[derive(Clone)]
pub struct PodProbe {
    /// Readiness answer returned by `is_ready`
    pub ready: Arc<AtomicBool>,
    /// Number of `init` calls across all instances
    pub inits: Arc<AtomicUsize>,
    /// Events observed by the pod's subscriptions
    pub hits: Arc<AtomicUsize>,
    /// Number of `shutdown` calls across all instances
    pub shutdowns: Arc<AtomicUsize>,
    /// Feature names in `init` order (shareable across probes)
    pub init_log: Arc<Mutex<Vec<String>>>,
    /// Feature names in `shutdown` order (shareable across probes)
    pub shutdown_log: Arc<Mutex<Vec<String>>>,
}

impl PodProbe {
    pub fn new() -> Self {
        Self::with_logs(
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(Mutex::new(Vec::new())),
        )
    }

    /// Probe sharing order logs with other probes, for cross-feature
    /// ordering assertions
    pub fn with_logs(
        init_log: Arc<Mutex<Vec<String>>>,
        shutdown_log: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(true)),
            inits: Arc::new(AtomicUsize::new(0)),
            hits: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
            init_log,
            shutdown_log,
        }
    }
}

impl Default for PodProbe {
    fn default() -> Self {
        Self::new()
    }
}

struct TestPod {
    contract: FeatureContract,
    subscribe_to: Vec<String>,
    probe: PodProbe,
}

impl Pod for TestPod {
    fn contract(&self) -> FeatureContract {
        self.contract.clone()
    }

    fn init(&mut self, ctx: &mut PodContext) -> Result<(), PodError> {
        self.probe.inits.fetch_add(1, Ordering::SeqCst);
        self.probe
            .init_log
            .lock()
            .unwrap()
            .push(ctx.feature_name().to_string());

        for event in &self.subscribe_to {
            let hits = Arc::clone(&self.probe.hits);
            ctx.subscribe(event, move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .map_err(|e| PodError::custom(e.to_string()))?;
        }
        Ok(())
    }

    fn api(&self) -> Arc<dyn FeatureApi> {
        let mut table = MethodTable::new();
        for method in self.contract.methods.keys() {
            table = table.with_method(method.clone(), Ok);
        }
        Arc::new(table)
    }

    fn is_ready(&self) -> bool {
        self.probe.ready.load(Ordering::SeqCst)
    }

    fn shutdown(&mut self) -> Result<(), PodError> {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.probe
            .shutdown_log
            .lock()
            .unwrap()
            .push(self.contract.name.clone());
        Ok(())
    }
}

/// Builtin factory producing instances observed through `probe`
pub fn pod_factory(
    contract: FeatureContract,
    subscribe_to: Vec<String>,
    probe: PodProbe,
) -> impl Fn() -> Box<dyn Pod> + Send + Sync + 'static {
    move || {
        Box::new(TestPod {
            contract: contract.clone(),
            subscribe_to: subscribe_to.clone(),
            probe: probe.clone(),
        })
    }
}

/// Write a feature directory with a `pod.toml` manifest
pub fn write_feature(root: &Path, name: &str, version: &str, dependencies: &[&str]) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let deps = dependencies
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    std::fs::write(
        dir.join("pod.toml"),
        format!("version = \"{version}\"\ndependencies = [{deps}]\n"),
    )
    .unwrap();
}

/// Loader over `root` with shared bus and registry handles
pub fn make_loader(root: &Path) -> (Arc<PodLoader>, Arc<EventBus>, Arc<ApiRegistry>) {
    make_loader_with(DiscoveryConfig {
        features_dir: root.to_path_buf(),
        ..DiscoveryConfig::default()
    })
}

pub fn make_loader_with(config: DiscoveryConfig) -> (Arc<PodLoader>, Arc<EventBus>, Arc<ApiRegistry>) {
    let bus = Arc::new(EventBus::new());
    let registry = Arc::new(ApiRegistry::new());
    let loader =
        Arc::new(PodLoader::new(config, Arc::clone(&bus), Arc::clone(&registry)).unwrap());
    (loader, bus, registry)
}
