//! Prometheus metrics for resources.
//!
//! Resources always record through the `metrics` facade; nothing is exported
//! until a recorder is installed. [`install_prometheus_recorder`] installs a
//! Prometheus recorder and returns a handle for rendering the scrape output.
//!
//! # Example
//!
//! ```rust,no_run
//! use composable_resource_runtime::metrics::install_prometheus_recorder;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = install_prometheus_recorder()?;
//! // ... dispatch actions ...
//! println!("{}", handle.render());
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other modules
pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Describe metrics and install a global Prometheus recorder.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed in
/// this process, or [`MetricsError::Build`] if the exporter is misconfigured.
pub fn install_prometheus_recorder() -> Result<PrometheusHandle, MetricsError> {
    register_metrics();

    let handle = PrometheusBuilder::new()
        // Reducers are expected to run in microseconds
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.000_01, 0.000_05, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1],
        )
        .map_err(|e| MetricsError::Build(e.to_string()))?
        .install_recorder()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    tracing::info!("Prometheus metrics recorder installed");
    Ok(handle)
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        "resource_dispatch_total",
        "Total number of actions dispatched to resources"
    );
    describe_counter!(
        "resource_dispatch_locked_total",
        "Total number of dispatches rejected because the resource was locked"
    );
    describe_counter!(
        "resource_epic_failures_total",
        "Total number of epics that failed or completed without a value"
    );
    describe_counter!(
        "resource_events_total",
        "Total number of completed actions folded into state"
    );
    describe_histogram!(
        "resource_reduce_duration_seconds",
        "Time taken to apply a reducer"
    );
}

/// Dispatch metrics recorder.
pub struct ResourceMetrics;

impl ResourceMetrics {
    /// Record an incoming dispatch.
    pub fn record_dispatch(action: &str) {
        counter!("resource_dispatch_total", "action" => action.to_string()).increment(1);
    }

    /// Record a dispatch rejected by the lock.
    pub fn record_locked(action: &str) {
        counter!("resource_dispatch_locked_total", "action" => action.to_string()).increment(1);
    }

    /// Record a failed epic.
    pub fn record_epic_failure(action: &str) {
        counter!("resource_epic_failures_total", "action" => action.to_string()).increment(1);
    }

    /// Record an applied event.
    pub fn record_event(reduce: Duration) {
        counter!("resource_events_total").increment(1);
        histogram!("resource_reduce_duration_seconds").record(reduce.as_secs_f64());
    }
}
