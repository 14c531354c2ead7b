//! Discovery metrics and loader health

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum retained entries in the recent-error log
pub const ERROR_LOG_CAPACITY: usize = 50;

/// One failed load attempt
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    /// Feature that failed
    pub feature: String,
    /// Error message
    pub error: String,
    /// When the failure happened
    pub timestamp: DateTime<Utc>,
}

/// Aggregate health of the loaded feature set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderHealth {
    /// Everything discovered is loaded
    Ok,
    /// Some features failed but others are live
    Degraded,
    /// Features exist but none is loaded
    Error,
}

impl LoaderHealth {
    /// String form used in payloads and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Degraded => "degraded",
            Self::Error => "error",
        }
    }
}

/// Counters and history kept by the loader, queryable at any time
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryMetrics {
    /// Features currently in the discovered set
    pub total_features: usize,
    /// Features in the loaded state
    pub loaded_features: usize,
    /// Features in the error state
    pub error_features: usize,
    /// Duration of the most recent scan, in milliseconds
    pub last_scan_duration_ms: u64,
    /// When the most recent scan finished
    pub last_scan: Option<DateTime<Utc>>,
    /// Number of completed hot reloads
    pub hot_reload_count: u64,
    /// Bounded ring of recent load failures, oldest first
    pub recent_errors: VecDeque<LoadFailure>,
}

impl DiscoveryMetrics {
    /// Append to the bounded error log
    pub fn record_failure(&mut self, feature: &str, error: &str) {
        self.recent_errors.push_back(LoadFailure {
            feature: feature.to_string(),
            error: error.to_string(),
            timestamp: Utc::now(),
        });
        while self.recent_errors.len() > ERROR_LOG_CAPACITY {
            self.recent_errors.pop_front();
        }
    }

    /// Health derived from the current counters: `error` when features
    /// exist but none is loaded, `degraded` when any feature is in the
    /// error state, `ok` otherwise.
    pub fn health(&self) -> LoaderHealth {
        if self.total_features > 0 && self.loaded_features == 0 {
            LoaderHealth::Error
        } else if self.error_features > 0 {
            LoaderHealth::Degraded
        } else {
            LoaderHealth::Ok
        }
    }
}
