//! podbay-core: host-side runtime for the podbay feature-pod system
//!
//! This crate provides the machinery that turns independently authored
//! feature pods into a live, wired system:
//!
//! - **Discovery & loading** - [`discovery::PodLoader`] scans a features
//!   directory, resolves dependency order, instantiates pods, and
//!   registers their contracts
//! - **Hot reload** - file changes unload and immediately reload the
//!   owning feature without a host restart
//! - **Observability** - [`discovery::DiscoveryMetrics`] and the
//!   registry's health report reflect partial failure explicitly
//!
//! The shared services pods talk to - the event bus and the API
//! registry - live in `podbay-pod-api` and are re-exported here for
//! embedders.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                     PodLoader                       │
//! │   scan ─> resolve deps ─> instantiate ─> register   │
//! │                  │                │                 │
//! └──────────────────┼────────────────┼─────────────────┘
//!                    ▼                ▼
//!             ┌────────────┐   ┌─────────────┐
//!             │  EventBus  │   │ ApiRegistry │
//!             └────────────┘   └─────────────┘
//!                    ▲                ▲
//!              emit/subscribe    get_feature
//!                    │                │
//!              ┌─────┴────────────────┴─────┐
//!              │        feature pods        │
//!              └────────────────────────────┘
//! ```

pub mod discovery;

// Re-export key types for convenience
pub use discovery::{
    DiscoveredFeature, DiscoveryConfig, DiscoveryError, DiscoveryMetrics, FeatureStatus,
    LoaderHealth, PodLoader, ScanSummary, Switchboard,
};
pub use podbay_pod_api::{
    ApiRegistry, EventBus, FeatureApi, FeatureContract, HealthReport, HealthState, MethodSpec,
    MethodTable, Pod, PodContext, PodError, PodEvent, RegistryError,
};
