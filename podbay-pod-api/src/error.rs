//! Error types for pod authors and registry consumers

use thiserror::Error;

/// Errors that pods can return from lifecycle hooks and API methods
#[derive(Error, Debug)]
pub enum PodError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// API method not exposed by this feature
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Custom error with message
    #[error("{0}")]
    Custom(String),
}

impl PodError {
    /// Create a custom error with a message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid-input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Errors raised by the event bus
#[derive(Error, Debug)]
pub enum BusError {
    /// Subscriptions must name a non-empty event
    #[error("Event name must not be empty")]
    EmptyEventName,
}

/// Errors raised by registry operations
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A method declared in the contract is missing from the API object
    #[error("Contract violation: feature '{feature}' declares method '{method}' but does not expose it")]
    ContractViolation { feature: String, method: String },

    /// A feature with this name is already registered
    #[error("Feature '{name}' is already registered")]
    DuplicateFeature { name: String },

    /// Lookup miss
    #[error("Feature '{name}' not found")]
    FeatureNotFound { name: String },

    /// A declared compatibility range does not match the registered dependency
    #[error(
        "Feature '{feature}' requires {dependency} {required}, but {found} is registered"
    )]
    IncompatibleDependency {
        feature: String,
        dependency: String,
        required: semver::VersionReq,
        found: semver::Version,
    },
}
