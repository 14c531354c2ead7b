//! Feature discovery, loading, and hot reload
//!
//! This module turns a directory tree into a live, wired set of
//! registered features and keeps it live as files change:
//!
//! - [`PodLoader`]: scan, dependency-ordered load, unload, hot reload
//! - [`DiscoveryConfig`]: directories, intervals, timeouts, patterns
//! - [`DiscoveredFeature`]: per-feature record and state machine
//! - [`DiscoveryMetrics`]: counters and the bounded recent-error log
//! - [`Switchboard`]: persisted enable/disable state for autoload
//!
//! # Feature layout
//!
//! Each feature is an immediate subdirectory of the features root:
//!
//! ```text
//! features/
//!   inventory-system/
//!     inventory-system.pod.so    <- shared library entry
//!     pod.toml                   <- optional: version, dependencies
//!     config.toml                <- optional: handed to the pod at init
//!   flask-system/
//!     pod.toml                   <- builtin entry (factory registered in host)
//! ```
//!
//! # Hot reload capability
//!
//! Shared-library pods get true code hot reload: the old library is
//! dropped after the instance and the file is re-opened, so a rebuilt
//! artifact is observed fresh. Builtin pods re-instantiate from their
//! registered factory - config and manifest changes are picked up live,
//! code changes need a host rebuild.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use podbay_core::discovery::{DiscoveryConfig, PodLoader};
//! use podbay_pod_api::{ApiRegistry, EventBus};
//!
//! # async fn example() -> Result<(), podbay_core::discovery::DiscoveryError> {
//! let bus = Arc::new(EventBus::new());
//! let registry = Arc::new(ApiRegistry::new());
//! let loader = Arc::new(PodLoader::new(DiscoveryConfig::default(), bus, registry)?);
//!
//! loader.start().await?;          // scan + autoload + watch
//! println!("{:?}", loader.metrics().await);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod loader;
mod metrics;
mod scanner;
mod switchboard;
mod watcher;

pub use config::DiscoveryConfig;
pub use error::{DiscoveryError, Result};
pub use loader::{DISCOVERY_SOURCE, PodFactory, PodLoader, ScanSummary, events};
pub use metrics::{DiscoveryMetrics, ERROR_LOG_CAPACITY, LoadFailure, LoaderHealth};
pub use scanner::{DiscoveredFeature, FeatureStatus, PodManifest, PodSource};
pub use switchboard::Switchboard;
