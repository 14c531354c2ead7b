//! podbay-pod-api - Pod API for the podbay feature runtime
//!
//! This crate provides the traits and types needed to write feature pods
//! for podbay. A pod is an isolated unit that exposes one validated API
//! through the [`ApiRegistry`] and communicates with other features only
//! through [`EventBus`] events - pods never import one another directly.
//!
//! Pods are native Rust dynamic libraries discovered and loaded from a
//! features directory, or builtin constructors registered with the host.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use podbay_pod_api::{
//!     export_pod, FeatureApi, FeatureContract, MethodSpec, MethodTable,
//!     Pod, PodContext, PodError,
//! };
//! use semver::Version;
//!
//! #[derive(Default)]
//! pub struct InventoryPod;
//!
//! impl Pod for InventoryPod {
//!     fn contract(&self) -> FeatureContract {
//!         FeatureContract::new("inventory-system", Version::new(1, 0, 0))
//!             .with_method("add_item", MethodSpec::default())
//!     }
//!
//!     fn init(&mut self, ctx: &mut PodContext) -> Result<(), PodError> {
//!         ctx.log_info("Inventory pod loaded");
//!         Ok(())
//!     }
//!
//!     fn api(&self) -> Arc<dyn FeatureApi> {
//!         Arc::new(MethodTable::new().with_method("add_item", |args| Ok(args)))
//!     }
//!
//!     fn shutdown(&mut self) -> Result<(), PodError> {
//!         Ok(())
//!     }
//! }
//!
//! export_pod!(InventoryPod);
//! ```

use std::sync::Arc;

pub mod api;
pub mod bus;
pub mod context;
pub mod contract;
pub mod error;
pub mod event;
pub mod registry;

pub use api::{ApiMethod, FeatureApi, HealthState, MethodTable};
pub use bus::{EventBus, EventHandler};
pub use context::{PodContext, PodSettings};
pub use contract::{FeatureContract, MethodSpec};
pub use error::{BusError, PodError, RegistryError};
pub use event::{PodEvent, SubscriptionId};
pub use registry::{ApiRegistry, HealthReport};

// Re-exported so pods depend on one crate for contract building.
pub use semver;

/// Current pod API version. Pods must match this exactly; the loader
/// checks it before instantiating anything from a dynamic library.
pub const API_VERSION: u32 = 1;

/// The core pod trait - implement this to create a podbay feature pod.
///
/// The loader drives the lifecycle: instantiate, [`Pod::init`] with the
/// shared bus and registry injected via [`PodContext`], poll
/// [`Pod::is_ready`] until the feature is operational, register
/// [`Pod::api`] under [`Pod::contract`], and eventually
/// [`Pod::shutdown`] at unload or hot reload.
pub trait Pod: Send + Sync {
    /// The feature's declared contract. Immutable once declared.
    fn contract(&self) -> FeatureContract;

    /// Called once after instantiation with the runtime services wired
    /// in. Subscribe to events and initialize state here.
    fn init(&mut self, ctx: &mut PodContext) -> Result<(), PodError>;

    /// The API object to register. Every method named in the contract
    /// must be callable on it.
    fn api(&self) -> Arc<dyn FeatureApi>;

    /// Readiness predicate polled by the loader until true or the load
    /// timeout elapses. Defaults to immediately ready.
    fn is_ready(&self) -> bool {
        true
    }

    /// Called at unload. Must be idempotent: invoking it a second time
    /// is observably identical to the first.
    fn shutdown(&mut self) -> Result<(), PodError>;
}

/// Export a pod type for dynamic loading.
///
/// Generates the C ABI entry points the podbay loader probes when it
/// opens a feature's shared library.
///
/// # Usage
///
/// ```ignore
/// podbay_pod_api::export_pod!(InventoryPod);
/// ```
///
/// # Generated Functions
///
/// - `_podbay_pod_create()`: creates a new pod instance
/// - `_podbay_pod_api_version()`: returns the API version
/// - `_podbay_pod_destroy()`: destroys a pod instance
#[macro_export]
macro_rules! export_pod {
    ($pod_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn _podbay_pod_create() -> *mut dyn $crate::Pod {
            let pod: Box<dyn $crate::Pod> = Box::new(<$pod_type>::default());
            Box::into_raw(pod)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _podbay_pod_api_version() -> u32 {
            $crate::API_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn _podbay_pod_destroy(ptr: *mut dyn $crate::Pod) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }
    };
}
