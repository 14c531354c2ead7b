//! Feature contracts - declarative descriptions of what a pod exposes

use std::collections::BTreeMap;

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};

/// Advisory description of one API method.
///
/// Only the method *name* is enforced at registration; params and return
/// type document intent for consumers and dashboards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MethodSpec {
    /// Parameter names, in call order
    #[serde(default)]
    pub params: Vec<String>,
    /// Return type description
    #[serde(default)]
    pub returns: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
}

impl MethodSpec {
    /// Describe a method
    pub fn new(
        params: impl IntoIterator<Item = impl Into<String>>,
        returns: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            params: params.into_iter().map(Into::into).collect(),
            returns: returns.into(),
            description: description.into(),
        }
    }
}

/// Declarative description of a feature: its methods, the events it
/// emits and listens to, and its dependencies with compatibility ranges.
///
/// Immutable once declared by a pod; the registry checks it at
/// registration and consumers can inspect it without invoking anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureContract {
    /// Feature name, the registry key
    pub name: String,
    /// Feature version (semver)
    pub version: Version,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Declared API methods, keyed by name
    #[serde(default)]
    pub methods: BTreeMap<String, MethodSpec>,
    /// Event names this feature emits
    #[serde(default)]
    pub emits: Vec<String>,
    /// Event names this feature subscribes to
    #[serde(default)]
    pub listens_to: Vec<String>,
    /// Names of features this one depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Acceptable version range per dependency
    #[serde(default)]
    pub compatibility: BTreeMap<String, VersionReq>,
}

impl FeatureContract {
    /// Start a contract for `name` at `version`
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            description: String::new(),
            methods: BTreeMap::new(),
            emits: Vec::new(),
            listens_to: Vec::new(),
            dependencies: Vec::new(),
            compatibility: BTreeMap::new(),
        }
    }

    /// Builder: set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: declare an API method
    pub fn with_method(mut self, name: impl Into<String>, spec: MethodSpec) -> Self {
        self.methods.insert(name.into(), spec);
        self
    }

    /// Builder: declare an emitted event
    pub fn emits(mut self, event: impl Into<String>) -> Self {
        self.emits.push(event.into());
        self
    }

    /// Builder: declare a subscribed event
    pub fn listens_to(mut self, event: impl Into<String>) -> Self {
        self.listens_to.push(event.into());
        self
    }

    /// Builder: declare a dependency, optionally with a compatibility range
    pub fn depends_on(mut self, feature: impl Into<String>, range: Option<VersionReq>) -> Self {
        let feature = feature.into();
        if let Some(range) = range {
            self.compatibility.insert(feature.clone(), range);
        }
        self.dependencies.push(feature);
        self
    }

    /// Method names declared by this contract
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}
