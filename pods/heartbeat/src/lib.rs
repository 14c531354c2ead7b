//! Heartbeat Pod - a simple example feature pod for podbay
//!
//! This pod demonstrates:
//! - Basic pod structure with the `export_pod!` macro
//! - Declaring a [`FeatureContract`] with methods and events
//! - Subscribing to bus events in `init`
//! - An idempotent `shutdown`
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p features/heartbeat
//! cp target/release/libheartbeat_pod.so features/heartbeat/heartbeat.pod.so
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use podbay_pod_api::{
    FeatureApi, FeatureContract, HealthState, MethodSpec, MethodTable, Pod, PodContext, PodError,
    export_pod, semver::Version,
};
use serde_json::json;

/// Counts `heartbeat.ping` events and reports them through its API.
#[derive(Default)]
pub struct HeartbeatPod {
    /// Pings observed since load (or the last reset)
    beats: Arc<AtomicU64>,
    /// Set once shutdown has run
    stopped: Arc<AtomicBool>,
}

impl Pod for HeartbeatPod {
    fn contract(&self) -> FeatureContract {
        FeatureContract::new("heartbeat", Version::new(0, 1, 0))
            .with_description("Counts heartbeat pings")
            .with_method(
                "status",
                MethodSpec::new(Vec::<String>::new(), "object", "Beat count and liveness"),
            )
            .with_method(
                "reset",
                MethodSpec::new(Vec::<String>::new(), "null", "Reset the beat counter"),
            )
            .listens_to("heartbeat.ping")
    }

    fn init(&mut self, ctx: &mut PodContext) -> Result<(), PodError> {
        let beats = Arc::clone(&self.beats);
        ctx.subscribe("heartbeat.ping", move |_| {
            beats.fetch_add(1, Ordering::SeqCst);
        })
        .map_err(|e| PodError::custom(e.to_string()))?;

        ctx.log_info("Heartbeat pod loaded");
        Ok(())
    }

    fn api(&self) -> Arc<dyn FeatureApi> {
        let beats = Arc::clone(&self.beats);
        let stopped = Arc::clone(&self.stopped);
        let beats_for_reset = Arc::clone(&self.beats);
        let stopped_for_health = Arc::clone(&self.stopped);

        Arc::new(
            MethodTable::new()
                .with_method("status", move |_| {
                    Ok(json!({
                        "beats": beats.load(Ordering::SeqCst),
                        "stopped": stopped.load(Ordering::SeqCst),
                    }))
                })
                .with_method("reset", move |_| {
                    beats_for_reset.store(0, Ordering::SeqCst);
                    Ok(json!(null))
                })
                .with_health(move || {
                    if stopped_for_health.load(Ordering::SeqCst) {
                        HealthState::Unhealthy
                    } else {
                        HealthState::Healthy
                    }
                }),
        )
    }

    fn shutdown(&mut self) -> Result<(), PodError> {
        // calling this twice is the same as calling it once
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

export_pod!(HeartbeatPod);
