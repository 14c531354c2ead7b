//! The duck-typed API surface a feature exposes to consumers

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PodError;

/// Health of a single feature, reported by its optional check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Feature is fully operational
    Healthy,
    /// Feature is operational with reduced capability
    Degraded,
    /// Feature is not operational
    Unhealthy,
    /// Feature did not answer (no check, timeout, or panic)
    #[default]
    Unknown,
}

impl HealthState {
    /// String form used in reports and payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
            Self::Unknown => "unknown",
        }
    }
}

/// The callable surface of a registered feature.
///
/// Methods are addressed by name with JSON arguments, mirroring how pods
/// cross the dynamic-load boundary. The registry checks at registration
/// that every method named in the contract answers [`FeatureApi::has_method`];
/// signatures are advisory and not enforced.
pub trait FeatureApi: Send + Sync {
    /// Names of all callable methods
    fn method_names(&self) -> Vec<String>;

    /// Invoke a method by name. Unknown names are
    /// [`PodError::UnknownMethod`].
    fn call(&self, method: &str, args: Value) -> Result<Value, PodError>;

    /// Whether `name` is callable on this API
    fn has_method(&self, name: &str) -> bool {
        self.method_names().iter().any(|m| m == name)
    }

    /// Optional liveness probe, polled by the registry's health report
    fn health_check(&self) -> HealthState {
        HealthState::Unknown
    }
}

/// Boxed method closure stored in a [`MethodTable`].
pub type ApiMethod = Arc<dyn Fn(Value) -> Result<Value, PodError> + Send + Sync>;

/// Convenience [`FeatureApi`] built from named closures.
///
/// Most pods assemble their API with this rather than hand-implementing
/// the trait.
#[derive(Default)]
pub struct MethodTable {
    methods: BTreeMap<String, ApiMethod>,
    health: Option<Arc<dyn Fn() -> HealthState + Send + Sync>>,
}

impl MethodTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a named method
    pub fn with_method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, PodError> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    /// Builder: set the health probe
    pub fn with_health<F>(mut self, f: F) -> Self
    where
        F: Fn() -> HealthState + Send + Sync + 'static,
    {
        self.health = Some(Arc::new(f));
        self
    }
}

impl FeatureApi for MethodTable {
    fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    fn call(&self, method: &str, args: Value) -> Result<Value, PodError> {
        match self.methods.get(method) {
            Some(f) => f(args),
            None => Err(PodError::UnknownMethod(method.to_string())),
        }
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn health_check(&self) -> HealthState {
        match &self.health {
            Some(f) => f(),
            None => HealthState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_table_dispatches_by_name() {
        let api = MethodTable::new()
            .with_method("echo", |args| Ok(args))
            .with_method("answer", |_| Ok(json!(42)));

        assert_eq!(api.call("echo", json!({"a": 1})).unwrap(), json!({"a": 1}));
        assert_eq!(api.call("answer", json!(null)).unwrap(), json!(42));
    }

    #[test]
    fn test_unknown_method_errors() {
        let api = MethodTable::new();
        let err = api.call("missing", json!(null)).unwrap_err();
        assert!(matches!(err, PodError::UnknownMethod(name) if name == "missing"));
    }

    #[test]
    fn test_has_method_and_names() {
        let api = MethodTable::new()
            .with_method("a", |_| Ok(json!(null)))
            .with_method("b", |_| Ok(json!(null)));

        assert!(api.has_method("a"));
        assert!(!api.has_method("c"));
        assert_eq!(api.method_names(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_health_defaults_to_unknown() {
        let api = MethodTable::new();
        assert_eq!(api.health_check(), HealthState::Unknown);

        let api = MethodTable::new().with_health(|| HealthState::Healthy);
        assert_eq!(api.health_check(), HealthState::Healthy);
    }

    #[test]
    fn test_health_state_as_str() {
        assert_eq!(HealthState::Healthy.as_str(), "healthy");
        assert_eq!(HealthState::Degraded.as_str(), "degraded");
        assert_eq!(HealthState::Unhealthy.as_str(), "unhealthy");
        assert_eq!(HealthState::Unknown.as_str(), "unknown");
    }
}
