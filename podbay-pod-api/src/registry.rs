//! Name-keyed directory of live feature implementations
//!
//! The registry is how one feature resolves another without importing
//! it: a pod registers its API object and contract under a stable name,
//! and consumers look it up with [`ApiRegistry::get_feature`]. A single
//! registry instance is created by the embedder and injected everywhere;
//! there are no ambient globals.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::api::{FeatureApi, HealthState};
use crate::contract::FeatureContract;
use crate::error::RegistryError;

/// Default timeout for one feature's health check.
const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// A live registration: the API object plus its declared contract.
#[derive(Clone)]
struct RegisteredFeature {
    api: Arc<dyn FeatureApi>,
    contract: FeatureContract,
}

/// Aggregated health across all registered features.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    /// Per-feature state
    pub features: BTreeMap<String, HealthState>,
    /// Count of features reporting healthy
    pub healthy: usize,
    /// Count of features reporting degraded
    pub degraded: usize,
    /// Count of features reporting unhealthy
    pub unhealthy: usize,
    /// Count of features that did not answer
    pub unknown: usize,
    /// Total registered features
    pub total_features: usize,
}

/// Directory of registered features and their contracts.
pub struct ApiRegistry {
    features: RwLock<HashMap<String, RegisteredFeature>>,
    health_timeout: Duration,
}

impl Default for ApiRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiRegistry {
    /// Create a registry with the default health-check timeout
    pub fn new() -> Self {
        Self::with_health_timeout(DEFAULT_HEALTH_TIMEOUT)
    }

    /// Create a registry with an explicit health-check timeout
    pub fn with_health_timeout(health_timeout: Duration) -> Self {
        Self {
            features: RwLock::new(HashMap::new()),
            health_timeout,
        }
    }

    /// Register a feature under its contract name.
    ///
    /// Fails with [`RegistryError::ContractViolation`] if any method
    /// named in the contract is absent from `api`, with
    /// [`RegistryError::DuplicateFeature`] on a name collision, and with
    /// [`RegistryError::IncompatibleDependency`] when a declared
    /// compatibility range does not match a registered dependency's
    /// version. The original registration is untouched on failure.
    pub fn register_feature(
        &self,
        api: Arc<dyn FeatureApi>,
        contract: FeatureContract,
    ) -> Result<(), RegistryError> {
        let mut features = self.write_lock();
        if features.contains_key(&contract.name) {
            return Err(RegistryError::DuplicateFeature {
                name: contract.name.clone(),
            });
        }
        Self::validate(&features, api.as_ref(), &contract)?;
        self.insert(&mut features, api, contract);
        Ok(())
    }

    /// Register a feature, replacing any existing registration in place.
    ///
    /// Same validation as [`ApiRegistry::register_feature`] minus the
    /// duplicate check. Used by the loader during hot reload.
    pub fn force_register_feature(
        &self,
        api: Arc<dyn FeatureApi>,
        contract: FeatureContract,
    ) -> Result<(), RegistryError> {
        let mut features = self.write_lock();
        Self::validate(&features, api.as_ref(), &contract)?;
        self.insert(&mut features, api, contract);
        Ok(())
    }

    /// Remove a registration. No-op (returns false) if absent.
    pub fn unregister_feature(&self, name: &str) -> bool {
        let removed = self.write_lock().remove(name).is_some();
        if removed {
            tracing::debug!(feature = %name, "Feature unregistered");
        }
        removed
    }

    /// Resolve a feature's live API object by name
    pub fn get_feature(&self, name: &str) -> Result<Arc<dyn FeatureApi>, RegistryError> {
        self.read_lock()
            .get(name)
            .map(|f| Arc::clone(&f.api))
            .ok_or_else(|| RegistryError::FeatureNotFound {
                name: name.to_string(),
            })
    }

    /// Existence probe for dependency pre-checks
    pub fn has_feature(&self, name: &str) -> bool {
        self.read_lock().contains_key(name)
    }

    /// The declared contract of a registered feature
    pub fn get_contract(&self, name: &str) -> Option<FeatureContract> {
        self.read_lock().get(name).map(|f| f.contract.clone())
    }

    /// Names of all registered features, sorted
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read_lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered features
    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.read_lock().is_empty()
    }

    /// Unregister everything. Test/shutdown isolation.
    pub fn clear(&self) {
        self.write_lock().clear();
    }

    /// Poll every feature's optional health check and aggregate.
    ///
    /// Each check runs on a blocking task under a short timeout; a check
    /// that times out, panics, or is simply not implemented counts as
    /// [`HealthState::Unknown`].
    pub async fn health_status(&self) -> HealthReport {
        let snapshot: Vec<(String, Arc<dyn FeatureApi>)> = self
            .read_lock()
            .iter()
            .map(|(name, f)| (name.clone(), Arc::clone(&f.api)))
            .collect();

        let mut report = HealthReport {
            total_features: snapshot.len(),
            ..HealthReport::default()
        };

        for (name, api) in snapshot {
            let check = tokio::task::spawn_blocking(move || api.health_check());
            let state = match tokio::time::timeout(self.health_timeout, check).await {
                Ok(Ok(state)) => state,
                Ok(Err(_)) => {
                    tracing::warn!(feature = %name, "Health check panicked");
                    HealthState::Unknown
                }
                Err(_) => {
                    tracing::warn!(feature = %name, timeout = ?self.health_timeout, "Health check timed out");
                    HealthState::Unknown
                }
            };
            match state {
                HealthState::Healthy => report.healthy += 1,
                HealthState::Degraded => report.degraded += 1,
                HealthState::Unhealthy => report.unhealthy += 1,
                HealthState::Unknown => report.unknown += 1,
            }
            report.features.insert(name, state);
        }
        report
    }

    /// Check method presence and dependency compatibility.
    ///
    /// Compatibility is only checked against dependencies that are
    /// present; absence is the loader's concern, not the registry's.
    fn validate(
        features: &HashMap<String, RegisteredFeature>,
        api: &dyn FeatureApi,
        contract: &FeatureContract,
    ) -> Result<(), RegistryError> {
        for method in contract.method_names() {
            if !api.has_method(method) {
                return Err(RegistryError::ContractViolation {
                    feature: contract.name.clone(),
                    method: method.to_string(),
                });
            }
        }
        for (dependency, required) in &contract.compatibility {
            if let Some(existing) = features.get(dependency)
                && !required.matches(&existing.contract.version)
            {
                return Err(RegistryError::IncompatibleDependency {
                    feature: contract.name.clone(),
                    dependency: dependency.clone(),
                    required: required.clone(),
                    found: existing.contract.version.clone(),
                });
            }
        }
        Ok(())
    }

    fn insert(
        &self,
        features: &mut HashMap<String, RegisteredFeature>,
        api: Arc<dyn FeatureApi>,
        contract: FeatureContract,
    ) {
        tracing::info!(feature = %contract.name, version = %contract.version, "Feature registered");
        features.insert(contract.name.clone(), RegisteredFeature { api, contract });
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredFeature>> {
        self.features
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, RegisteredFeature>> {
        self.features
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
