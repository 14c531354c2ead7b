//! Discovery and loader error types

use std::time::Duration;
use thiserror::Error;

use podbay_pod_api::{PodError, RegistryError};

/// Errors that can occur while discovering, loading, or reloading features
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Feature is not in the discovered set
    #[error("Feature '{name}' not found")]
    FeatureNotFound { name: String },

    /// A declared dependency is neither registered nor discoverable
    #[error("Feature '{feature}' depends on '{dependency}', which is neither registered nor discoverable")]
    MissingDependency { feature: String, dependency: String },

    /// A discoverable dependency failed to load
    #[error("Feature '{feature}' depends on '{dependency}', which failed to load")]
    DependencyFailed { feature: String, dependency: String },

    /// Dependency declarations form a cycle
    #[error("Circular dependency: {chain}")]
    CircularDependency { chain: String },

    /// The entry library does not export the expected symbol
    #[error("Feature '{feature}' library is missing export '{symbol}'")]
    MissingExport { feature: String, symbol: String },

    /// A builtin feature has no registered constructor
    #[error("Feature '{feature}' is marked builtin but no factory is registered for it")]
    NoBuiltinFactory { feature: String },

    /// Pod API version mismatch between host and library
    #[error("API version mismatch: host expects {expected}, pod has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// The pod never became ready within the load timeout
    #[error("Feature '{feature}' did not become ready within {timeout:?}")]
    InitializationTimeout { feature: String, timeout: Duration },

    /// Failed to load the dynamic library
    #[error("Failed to load pod library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// Pod lifecycle hook failed
    #[error("Pod error: {0}")]
    Pod(#[from] PodError),

    /// Contract registration failed
    #[error("Registration failed: {0}")]
    Registry(#[from] RegistryError),

    /// Invalid discovery or switchboard configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid glob pattern
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    /// Filesystem watcher error
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used through the discovery module
pub type Result<T> = std::result::Result<T, DiscoveryError>;
